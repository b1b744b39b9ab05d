use crate::types::{BestFormula, TrainingRecord};
use std::sync::mpsc::Sender;

/// Observer for a training run. Errors returned from `on_step_complete` are logged by the
/// trainer and never abort the run.
pub trait ProgressCallback: Send {
    fn on_step_start(&mut self, _step: usize, _total: usize) {}
    fn on_step_complete(&mut self, record: &TrainingRecord) -> anyhow::Result<()>;
    fn on_new_best(&mut self, _best: &BestFormula) {}
}

impl<F> ProgressCallback for F
where
    F: FnMut(&TrainingRecord) -> anyhow::Result<()> + Send,
{
    fn on_step_complete(&mut self, record: &TrainingRecord) -> anyhow::Result<()> {
        self(record)
    }
}

/// Discards every event.
pub struct SilentProgressCallback;

impl ProgressCallback for SilentProgressCallback {
    fn on_step_complete(&mut self, _record: &TrainingRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct ConsoleProgressCallback {
    every: usize,
}

impl ConsoleProgressCallback {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1) }
    }
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_step_complete(&mut self, record: &TrainingRecord) -> anyhow::Result<()> {
        if record.step % self.every == 0 {
            println!(
                "Step {:>4} | loss {:>9.4} | reward mean {:>8.3} max {:>8.3} | valid {:>5.1}% | best {}",
                record.step,
                record.loss,
                record.reward_mean,
                record.reward_max,
                record.valid_fraction * 100.0,
                match (&record.best_score, &record.best_formula) {
                    (Some(score), Some(formula)) => format!("{:.4} {}", score, formula),
                    _ => "-".to_string(),
                }
            );
        }
        Ok(())
    }

    fn on_new_best(&mut self, best: &BestFormula) {
        println!("  New best at step {}: {} ({:.4})", best.step, best.formula, best.score);
    }
}

/// Forwards events to another thread, e.g. a UI or service loop.
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone)]
pub enum ProgressMessage {
    StepStart { step: usize, total: usize },
    StepComplete(TrainingRecord),
    NewBest(BestFormula),
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_step_start(&mut self, step: usize, total: usize) {
        let _ = self.sender.send(ProgressMessage::StepStart { step, total });
    }

    fn on_step_complete(&mut self, record: &TrainingRecord) -> anyhow::Result<()> {
        self.sender
            .send(ProgressMessage::StepComplete(record.clone()))
            .map_err(|_| anyhow::anyhow!("progress receiver disconnected"))
    }

    fn on_new_best(&mut self, best: &BestFormula) {
        let _ = self.sender.send(ProgressMessage::NewBest(best.clone()));
    }
}

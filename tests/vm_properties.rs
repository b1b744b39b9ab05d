use alphagen::data::FeatureTensor;
use alphagen::engines::evaluation::StackVm;
use alphagen::functions::Vocabulary;
use alphagen::types::Token;
use ndarray::{s, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn setup() -> (Arc<Vocabulary>, StackVm) {
    let vocab = Arc::new(Vocabulary::standard());
    (vocab.clone(), StackVm::new(vocab))
}

fn tok(vocab: &Vocabulary, name: &str) -> Token {
    vocab.name_to_token(name).unwrap()
}

fn random_tensor(rng: &mut StdRng, batch: usize, channels: usize, time: usize) -> FeatureTensor {
    let values = (0..batch * channels * time)
        .map(|_| rng.gen_range(-3.0..3.0))
        .collect();
    FeatureTensor::from_shape_vec((batch, channels, time), values).unwrap()
}

#[test]
fn test_add_of_constant_channels() {
    let (vocab, vm) = setup();
    let mut data = Array3::zeros((1, 6, 10));
    data.slice_mut(s![0, 0, ..]).fill(1.0);
    data.slice_mut(s![0, 1, ..]).fill(2.0);
    let tensor = FeatureTensor::new(data);

    let formula = [tok(&vocab, "RET"), tok(&vocab, "VOL"), tok(&vocab, "ADD")];
    let factor = vm.execute(&formula, &tensor).unwrap();

    assert_eq!(factor.dim(), (1, 10));
    assert!(factor.iter().all(|&v| v == 3.0));
}

#[test]
fn test_lone_operator_is_invalid() {
    let (vocab, vm) = setup();
    let tensor = FeatureTensor::new(Array3::zeros((1, 6, 10)));
    let formula = [tok(&vocab, "ADD")];

    assert!(vm.execute(&formula, &tensor).is_none());
    assert!(!vm.validate(&formula));
}

#[test]
fn test_out_of_range_feature_returns_none() {
    let (_, vm) = setup();
    let tensor = FeatureTensor::new(Array3::zeros((1, 6, 10)));
    assert!(vm.execute(&[99], &tensor).is_none());
}

#[test]
fn test_feature_beyond_tensor_channels_returns_none() {
    let (vocab, vm) = setup();
    // Vocabulary knows NEWS_COUNT but the tensor only carries 4 channels
    let tensor = FeatureTensor::new(Array3::zeros((1, 4, 10)));
    let news = tok(&vocab, "NEWS_COUNT");
    assert!(vm.validate(&[news]));
    assert!(vm.execute(&[news], &tensor).is_none());
}

#[test]
fn test_decode_preserves_argument_order() {
    let (vocab, vm) = setup();
    let formula = [tok(&vocab, "RET"), tok(&vocab, "VOL"), tok(&vocab, "ADD")];
    assert_eq!(vm.decode(&formula), "ADD(RET, VOL)");

    let nested = [
        tok(&vocab, "RET"),
        tok(&vocab, "DELAY1"),
        tok(&vocab, "NEG"),
        tok(&vocab, "VOL"),
        tok(&vocab, "SENTIMENT"),
        tok(&vocab, "GATE"),
    ];
    assert_eq!(vm.decode(&nested), "GATE(NEG(DELAY1(RET)), VOL, SENTIMENT)");
}

#[test]
fn test_validate_agrees_with_execute() {
    let (vocab, vm) = setup();
    let mut rng = StdRng::seed_from_u64(11);
    let size = vocab.size() as Token;

    // Every formula of length 1 and 2, plus random longer ones including unknown tokens
    let mut formulas: Vec<Vec<Token>> = Vec::new();
    for a in 0..size {
        formulas.push(vec![a]);
        for b in 0..size {
            formulas.push(vec![a, b]);
        }
    }
    for _ in 0..2000 {
        let len = rng.gen_range(1..=8);
        formulas.push((0..len).map(|_| rng.gen_range(0..size + 2)).collect());
    }

    for _ in 0..3 {
        let tensor = random_tensor(&mut rng, 2, 6, 12);
        for formula in &formulas {
            let executed = vm.execute(formula, &tensor);
            assert_eq!(
                vm.validate(formula),
                executed.is_some(),
                "disagreement on {:?}",
                formula
            );
        }
    }
}

#[test]
fn test_successful_execution_decodes_cleanly() {
    let (vocab, vm) = setup();
    let mut rng = StdRng::seed_from_u64(5);
    let tensor = random_tensor(&mut rng, 3, 6, 16);
    let size = vocab.size() as Token;

    let mut checked = 0;
    for _ in 0..5000 {
        let len = rng.gen_range(1..=8);
        let formula: Vec<Token> = (0..len).map(|_| rng.gen_range(0..size)).collect();
        if let Some(factor) = vm.execute(&formula, &tensor) {
            checked += 1;
            let text = vm.decode(&formula);
            assert!(!text.starts_with('<'), "{:?} decoded to {}", formula, text);
            assert!(factor.iter().all(|v| v.is_finite()));
        }
    }
    assert!(checked > 0);
}

#[test]
fn test_execution_does_not_touch_input() {
    let (vocab, vm) = setup();
    let mut data = Array3::zeros((1, 6, 5));
    data[[0, 0, 2]] = f64::NAN;
    data[[0, 1, 3]] = f64::INFINITY;
    let tensor = FeatureTensor::new(data);

    let factor = vm
        .execute(&[0, 1, tok(&vocab, "ADD")], &tensor)
        .unwrap();
    assert!(factor.iter().all(|v| v.is_finite()));
    assert!(tensor.data()[[0, 0, 2]].is_nan());
}

#[test]
fn test_name_round_trip() {
    let vocab = Vocabulary::standard();
    for token in 0..vocab.size() as Token {
        let name = vocab.token_to_name(token).unwrap();
        assert_eq!(vocab.name_to_token(name).unwrap(), token);
    }
    for name in vocab.feature_names() {
        let token = vocab.name_to_token(name).unwrap();
        assert_eq!(vocab.token_to_name(token).unwrap(), name);
    }
}

use alphagen::engines::evaluation::{FormulaParser, StackVm};
use alphagen::error::AlphagenError;
use alphagen::functions::Vocabulary;
use std::sync::Arc;

fn setup() -> (FormulaParser, StackVm) {
    let vocab = Arc::new(Vocabulary::standard());
    (FormulaParser::new(vocab.clone()), StackVm::new(vocab))
}

#[test]
fn test_decoded_text_parses_back() {
    let (parser, vm) = setup();
    for text in [
        "RET",
        "ADD(RET, VOL)",
        "NEG(DELAY1(RET))",
        "DIV(TS_MEAN5(VOLUME_CHG), ADD(TS_STD5(RET), ABS(SENTIMENT)))",
        "GATE(SUB(SENTIMENT, NEWS_COUNT), DECAY(RET), NEG(RET))",
    ] {
        let formula = parser.parse(text).unwrap();
        assert!(vm.validate(&formula), "{}", text);
        assert_eq!(vm.decode(&formula), text);
    }
}

#[test]
fn test_whitespace_and_commas_are_irrelevant() {
    let (parser, _) = setup();
    let compact = parser.parse("MUL(RET,VOL)").unwrap();
    let spaced = parser.parse("  MUL ( RET ,  VOL ) ").unwrap();
    assert_eq!(compact, spaced);
}

#[test]
fn test_unknown_name_is_parse_error() {
    let (parser, _) = setup();
    match parser.parse("ADD(RET, OPEN_INTEREST)") {
        Err(AlphagenError::Parse(msg)) => assert!(msg.contains("OPEN_INTEREST")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_numeric_literal_is_parse_error() {
    let (parser, _) = setup();
    match parser.parse("MUL(RET, 0.5)") {
        Err(AlphagenError::Parse(msg)) => assert!(msg.contains("numeric literal")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_postfix_text_is_not_reordered() {
    let (parser, vm) = setup();
    // Malformed postfix still resolves; the VM decides validity
    let formula = parser.parse("RET ADD").unwrap();
    assert_eq!(formula.len(), 2);
    assert!(!vm.validate(&formula));
}

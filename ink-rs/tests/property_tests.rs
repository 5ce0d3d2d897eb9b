use std::collections::HashMap;

use proptest::prelude::*;
use ink::content::Content;
use ink::error::ExprError;
use ink::parser::parse_source;
use ink::script::expand::expand;
use ink::script::expr::{eval_str, EvalContext};
use ink::script::value::Value;
use ink::Story;

/// Variables only; every call fails.
#[derive(Default)]
struct Vars(HashMap<String, Value>);

impl EvalContext for Vars {
    fn has_variable(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
    fn get_value(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or_default()
    }
    fn has_function(&self, _name: &str) -> bool {
        false
    }
    fn call_function(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, ExprError> {
        Err(ExprError::UnknownIdentifier(name.to_owned()))
    }
    fn random_below(&mut self, _bound: usize) -> usize {
        0
    }
}

fn vars() -> Vars {
    let mut v = Vars::default();
    v.0.insert("x".into(), Value::from(3));
    v.0.insert("name".into(), Value::from("Ann"));
    v
}

proptest! {
    #[test]
    fn parser_does_not_panic(src in "[ -~\n\t]{0,300}") {
        let mut content = Content::new();
        let _ = parse_source(&src, "main.ink", &mut content);
    }

    #[test]
    fn line_shaped_sources_do_not_panic(
        lines in prop::collection::vec(
            prop_oneof![
                "== [a-z]{1,6}",
                "= [a-z]{1,6}",
                "[*+]{1,3} (\\([a-z]{1,4}\\) )?(\\{[a-z<> 0-9]{0,8}\\} )?[a-z ]{0,10}(\\[[a-z]{0,5}\\])?",
                "-{1,3} [a-z ]{0,10}",
                "(->|<>) ?[a-z.]{0,8}",
                "VAR [a-z]{1,4} = [0-9a-z\"]{0,4}",
                "~ [a-z]{1,4} = [-+*/0-9a-z ]{0,8}",
                "\\{ ?(stopping|cycle|once|shuffle|[a-z]{1,3})?:?",
                "- (else|[a-z0-9 >]{0,6}):",
                "\\}",
                "[A-Za-z ,.{}|&!~?]{0,20}",
            ],
            0..24,
        )
    ) {
        let mut content = Content::new();
        let _ = parse_source(&lines.join("\n"), "main.ink", &mut content);
    }

    #[test]
    fn evaluator_does_not_panic(src in "[ -~]{0,60}") {
        let _ = eval_str(&src, &mut vars());
    }

    #[test]
    fn expansion_does_not_panic(text in "[ -~]{0,80}", count in 0u32..10) {
        let _ = expand(&text, count, &mut vars());
    }

    #[test]
    fn integer_arithmetic_is_exact(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let got = eval_str(&format!("{a} + {b} * 2 - ({a} - {b})"), &mut vars()).unwrap();
        prop_assert_eq!(got, Value::from(a + b * 2 - (a - b)));
    }

    #[test]
    fn choice_gating_is_stable(x in -5i64..5, n in -5i64..5) {
        let src = format!("== start\nPick.\n* {{x > {n}}} Above\n* {{x <= {n}}} Below\n* Always\n");
        let mut story = Story::from_source(&src).unwrap();
        story.set_variable("x", x);
        story.advance_all().unwrap();
        let expected = [if x > n { "Above" } else { "Below" }, "Always"];
        prop_assert_eq!(story.pending_choices(), expected);
        prop_assert_eq!(story.pending_choices(), expected);
        prop_assert_eq!(story.pending_choice_count(), 2);
    }
}

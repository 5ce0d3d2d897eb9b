use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ink::error::ExprError;
use ink::script::expand::expand;
use ink::script::expr::{eval_str, EvalContext, Expression};
use ink::script::value::Value;
use ink::Story;

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
    fn random_below(&mut self, bound: usize) -> usize {
        bound / 2
    }
}

fn make_ctx() -> Vars {
    let vars = [("gold", 12), ("x", 3), ("y", -4), ("weight", 20)]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), Value::from(v as i64)))
        .collect();
    Vars(vars)
}

const ARITH: &str = "((gold * 2) - (x * x) + y) / 3";
const LOGIC: &str = "gold > 10 and (x == 3 or y >= 0) && weight != 0";
const TEXT: &str = "You carry {weight} stones and {gold} coins. \
                    {gold > 10:You feel rich.|You feel poor.} \
                    {&Dawn|Noon|Dusk} breaks. {~rain|sun|fog}. {? x : none|one|two|three|many}";

const STORY: &str = "\
== start
VAR round = 0
-> table
== table
~ round = round + 1
The croupier deals {&a card|another card|the last card}.
+ {round < 50} [Again] -> table
* [Stop] -> END
";

fn bench_eval(c: &mut Criterion) {
    let mut ctx = make_ctx();
    let compiled = Expression::parse(ARITH, &ctx).expect("valid expression");

    let mut g = c.benchmark_group("expressions");

    g.bench_function("eval_str_arith", |b| {
        b.iter(|| eval_str(black_box(ARITH), &mut ctx))
    });
    g.bench_function("compiled_arith", |b| {
        b.iter(|| black_box(&compiled).eval(&mut ctx))
    });
    g.bench_function("eval_str_logic", |b| {
        b.iter(|| eval_str(black_box(LOGIC), &mut ctx))
    });
    g.bench_function("expand_text", |b| {
        b.iter(|| expand(black_box(TEXT), black_box(2), &mut ctx))
    });

    g.finish();
}

fn bench_story(c: &mut Criterion) {
    let mut g = c.benchmark_group("story");

    g.bench_function("load", |b| b.iter(|| Story::from_source(black_box(STORY))));
    g.bench_function("play_fifty_rounds", |b| {
        b.iter(|| {
            let mut story = Story::load_seeded(
                Box::new(ink::MemoryHost::new().with_source("main.ink", STORY)),
                "main.ink",
                7,
            )
            .expect("story loads");
            while story.advance_all().is_ok() && story.pending_choice_count() > 0 {
                if story.choose(0).is_err() {
                    break;
                }
            }
            black_box(story.transcript().len())
        })
    });

    g.finish();
}

criterion_group!(benches, bench_eval, bench_story);
criterion_main!(benches);

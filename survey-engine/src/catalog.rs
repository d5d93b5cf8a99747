//! Built-in survey rules for the cave floors we track.

use crate::rules::{ClassificationRule, Condition, EntityMatch, Expected, KeyTemplate, NotableRule};
use crate::target::TargetDescriptor;

fn target(code: &str, sublevel: u32) -> TargetDescriptor {
    TargetDescriptor::new(code, sublevel)
}

fn creature(name: &str) -> EntityMatch {
    EntityMatch::creature(name)
}

fn presence(field: &str, name: &str) -> ClassificationRule {
    ClassificationRule::single(KeyTemplate::new().presence(field, creature(name)))
}

fn count(field: &str, name: &str) -> ClassificationRule {
    ClassificationRule::single(KeyTemplate::new().count(field, creature(name)))
}

fn eggs() -> KeyTemplate {
    KeyTemplate::new().count("eggs", creature("Egg"))
}

fn eggs_at_least(min: u32) -> NotableRule {
    NotableRule::new(
        eggs(),
        Condition::AtLeast {
            field: "eggs".to_string(),
            min,
        },
    )
}

fn expected(field: &str, value: u32) -> Expected {
    Expected {
        field: field.to_string(),
        value,
    }
}

/// Every built-in `(target, rule)` pair.
#[must_use]
pub fn builtin_rules() -> Vec<(TargetDescriptor, ClassificationRule)> {
    let mut rules = Vec::new();

    for (code, sublevel) in [("FC", 4), ("BK", 6), ("GK", 5), ("SR", 5)] {
        rules.push((target(code, sublevel), presence("murasakipom", "BlackPom")));
    }
    for (code, sublevel) in [("FC", 7), ("SC", 4)] {
        rules.push((target(code, sublevel), presence("oogane", "Wealthy")));
    }

    rules.push((target("SCx", 4), count("whitepom", "WhitePom")));
    rules.push((target("SCx", 7), presence("fixedTamakokin", "FminiHoudai")));
    rules.push((target("BK", 4), count("murasakipom", "BlackPom")));
    rules.push((target("CoS", 3), presence("popogashi", "RandPom")));
    rules.push((
        target("CoS", 4),
        ClassificationRule::single(
            KeyTemplate::new().presence("chocolate", creature("Jigumo").carrying("chocolate")),
        ),
    ));
    rules.push((
        target("GK", 3),
        ClassificationRule::single(KeyTemplate::new().presence("yellowpom", creature("YellowPom")))
            .and_key(
                KeyTemplate::new().presence("castanets", EntityMatch::treasure("castanets")),
            ),
    ));
    rules.push((target("SR", 6), presence("onarashi", "Fart")));
    rules.push((
        target("SR", 7),
        presence("kemekuji", "UmiMushi").with_notable(NotableRule::new(
            KeyTemplate::new().presence("kemekuji", creature("UmiMushi")),
            Condition::IsFalse {
                field: "kemekuji".to_string(),
            },
        )),
    ));
    rules.push((target("CH2", 2), count("mitites", "TamagoMushi")));
    rules.push((target("CH5", 2), ClassificationRule::single(eggs())));
    rules.push((
        target("CH8", 1),
        count("kocha", "Kochappy").with_notable(NotableRule::new(
            KeyTemplate::new().count("kocha", creature("Kochappy")),
            Condition::AtMost {
                field: "kocha".to_string(),
                max: 3,
            },
        )),
    ));
    rules.push((
        target("CH18", 1),
        ClassificationRule::single(eggs())
            .and_key(KeyTemplate::new().presence("yakicha", creature("FireChappy")))
            .with_notable(eggs_at_least(7)),
    ));
    rules.push((
        target("CH20", 1),
        ClassificationRule::single(eggs()).with_notable(eggs_at_least(5)),
    ));
    rules.push((
        target("CH21", 1),
        ClassificationRule::single(
            KeyTemplate::new()
                .count("ujimesu", creature("UjiA"))
                .count("ujiosu", creature("UjiB"))
                .count("tobinko", creature("Tobi")),
        )
        .with_notable(NotableRule::new(
            KeyTemplate::new()
                .count("bikkuri", creature("Hana"))
                .count("haori", creature("Armor"))
                .count("oogane", creature("Wealthy"))
                .count("ujimesu", creature("UjiA"))
                .count("ujiosu", creature("UjiB"))
                .count("tobinko", creature("Tobi")),
            Condition::Deviates {
                expected: vec![
                    expected("bikkuri", 2),
                    expected("haori", 3),
                    expected("oogane", 1),
                ],
            },
        )),
    ));
    rules.push((
        target("CH26", 3),
        ClassificationRule::single(eggs()).with_notable(eggs_at_least(10)),
    ));
    rules.push((
        target("CH28", 1),
        ClassificationRule::single(eggs().presence("elec", creature("ElecOtakara")))
            .and_key(KeyTemplate::new().flag("geyser", "geyser")),
    ));
    rules.push((
        target("CH29", 1),
        ClassificationRule::single(eggs()).with_notable(eggs_at_least(7)),
    ));

    rules
}

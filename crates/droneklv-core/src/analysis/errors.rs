use std::collections::BTreeMap;

use crate::ErrorSummary;

const MAX_EXAMPLES: usize = 3;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Udp,
    Ts,
    Klv,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Udp => "udp",
            Stage::Ts => "ts",
            Stage::Klv => "klv",
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    count: u64,
    examples: Vec<String>,
}

/// Per-kind error counts with the first few examples of each.
#[derive(Debug, Default)]
pub(crate) struct ErrorTally {
    entries: BTreeMap<(Stage, &'static str), Tally>,
}

impl ErrorTally {
    pub fn record(&mut self, stage: Stage, kind: &'static str, example: impl FnOnce() -> String) {
        let entry = self.entries.entry((stage, kind)).or_default();
        entry.count += 1;
        if entry.examples.len() < MAX_EXAMPLES {
            entry.examples.push(example());
        }
    }

    pub fn into_summaries(self) -> Vec<ErrorSummary> {
        self.entries
            .into_iter()
            .map(|((stage, kind), tally)| ErrorSummary {
                stage: stage.as_str().to_string(),
                kind: kind.to_string(),
                count: tally.count,
                examples: tally.examples,
            })
            .collect()
    }
}

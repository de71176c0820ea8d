use std::collections::{BTreeMap, BTreeSet};

/// Keyword rules for the drone and FPV content the aggregator targets.
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    ("DJI", &["dji", "mavic", "avata", "osmo", "mini 4", "air 3"]),
    ("FPV", &["fpv", "freestyle", "whoop", "goggles", "betaflight"]),
    ("Review", &["review", "hands-on", "hands on", "tested", "vs "]),
    ("Tutorial", &["tutorial", "how to", "guide", "tips", "beginner"]),
    ("News", &["announce", "launch", "release", "leak", "update"]),
    ("Regulation", &["faa", "regulation", "remote id", "part 107", "easa", "drone ban"]),
    ("Cinematic", &["cinematic", "cinewhoop", "footage", "color grading", "4k"]),
    ("Build", &["build", "frame", "motor", "props", "solder"]),
];

/// Infers topical tags from free text with case-insensitive substring rules.
#[derive(Debug, Clone, Default)]
pub struct Tagger {
    rules: BTreeMap<String, Vec<String>>,
}

impl Tagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_rules() -> Self {
        let mut tagger = Self::new();
        for (tag, keywords) in DEFAULT_RULES {
            tagger.add_rule(tag, keywords.iter().copied());
        }
        tagger
    }

    /// Replace the keyword list for `tag`. Keywords are stored lowercase.
    pub fn add_rule<I, S>(&mut self, tag: &str, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.rules.insert(tag.to_string(), keywords);
    }

    pub fn remove_rule(&mut self, tag: &str) -> bool {
        self.rules.remove(tag).is_some()
    }

    /// Snapshot of the rule table; mutating it leaves the tagger unchanged.
    pub fn get_rules(&self) -> BTreeMap<String, Vec<String>> {
        self.rules.clone()
    }

    pub fn infer_tags(&self, title: &str, content: &str) -> BTreeSet<String> {
        let text = format!("{} {}", title, content).to_lowercase();
        self.rules
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

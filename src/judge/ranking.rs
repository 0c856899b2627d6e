//! Ranking extraction from free-text arbiter responses.

use super::anonymize::Anonymization;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One position in a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSlot {
    Label(String),
    Unranked,
}

impl RankSlot {
    pub fn label(&self) -> Option<&str> {
        match self {
            RankSlot::Label(label) => Some(label),
            RankSlot::Unranked => None,
        }
    }
}

/// Parse an arbiter response into `labels.len()` ranked slots.
///
/// Lines are scanned top to bottom. A line naming exactly one label fills
/// the next open position with it, unless that label was already placed.
/// Lines naming zero or several labels are skipped. Positions nobody
/// filled are [`RankSlot::Unranked`].
pub fn parse_ranking(response: &str, labels: &[String]) -> Vec<RankSlot> {
    let mut ranking = Vec::with_capacity(labels.len());
    let mut placed: HashSet<&str> = HashSet::new();

    for line in response.lines() {
        if ranking.len() == labels.len() {
            break;
        }

        let mut found = labels.iter().filter(|label| line.contains(label.as_str()));
        let (Some(label), None) = (found.next(), found.next()) else {
            continue;
        };

        if placed.insert(label.as_str()) {
            ranking.push(RankSlot::Label(label.clone()));
        }
    }

    ranking.resize(labels.len(), RankSlot::Unranked);
    ranking
}

/// Map a ranking back to model names. Unranked slots stay `None`.
pub fn deanonymize<'a>(ranking: &'a [RankSlot], anonymization: &'a Anonymization) -> Vec<Option<&'a str>> {
    ranking
        .iter()
        .map(|slot| slot.label().and_then(|label| anonymization.model_for(label)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::anonymize::JudgePanel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn labels() -> Vec<String> {
        ["Alpha", "Beta", "Gamma", "Delta"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn slots(items: &[Option<&str>]) -> Vec<RankSlot> {
        items
            .iter()
            .map(|item| match item {
                Some(label) => RankSlot::Label(label.to_string()),
                None => RankSlot::Unranked,
            })
            .collect()
    }

    #[test]
    fn test_full_ranking() {
        let response = "After comparing the answers:\n\n1. Gamma\n2. Alpha\n3. Delta\n4. Beta\n";
        assert_eq!(
            parse_ranking(response, &labels()),
            slots(&[Some("Gamma"), Some("Alpha"), Some("Delta"), Some("Beta")])
        );
    }

    #[test]
    fn test_partial_ranking_is_padded() {
        let response = "1. Delta\n2. Beta";
        assert_eq!(
            parse_ranking(response, &labels()),
            slots(&[Some("Delta"), Some("Beta"), None, None])
        );
    }

    #[test]
    fn test_lines_with_several_labels_are_skipped() {
        let response = "Alpha and Beta are both wrong.\n1. Gamma\n2. Alpha";
        assert_eq!(
            parse_ranking(response, &labels()),
            slots(&[Some("Gamma"), Some("Alpha"), None, None])
        );
    }

    #[test]
    fn test_repeated_label_keeps_first_position() {
        let response = "1. Beta\n2. Beta again\n3. Alpha";
        assert_eq!(
            parse_ranking(response, &labels()),
            slots(&[Some("Beta"), Some("Alpha"), None, None])
        );
    }

    #[test]
    fn test_no_labels() {
        assert_eq!(parse_ranking("", &labels()), slots(&[None, None, None, None]));
        assert_eq!(
            parse_ranking("I cannot decide.", &labels()),
            slots(&[None, None, None, None])
        );
    }

    #[test]
    fn test_stops_after_all_positions_filled() {
        let response = "Alpha\nBeta\nGamma\nDelta\nAlpha";
        let ranking = parse_ranking(response, &labels());
        assert_eq!(ranking.len(), 4);
        assert!(ranking.iter().all(|slot| slot.label().is_some()));
    }

    #[test]
    fn test_deanonymize() {
        let panel = JudgePanel::default();
        let anon = panel.anonymize(&mut StdRng::seed_from_u64(3));
        let ranking = slots(&[Some("Beta"), None, Some("Alpha"), None]);

        let models = deanonymize(&ranking, &anon);
        assert_eq!(models[0], anon.model_for("Beta"));
        assert_eq!(models[1], None);
        assert_eq!(models[2], anon.model_for("Alpha"));
    }
}

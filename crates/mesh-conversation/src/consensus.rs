//! Numeric/string consensus.

use mesh_types::{Consensus, ConsensusVerdict, ParticipantResponse};

/// Tolerant of thousands separators and a leading currency symbol.
pub fn parse_numeric_response(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Bands: *match* (equal), *near_match* (≤1% spread from mean), *close*
/// (≤5%), *disagree* otherwise. Non-numeric responses compare by
/// normalized string equality.
pub fn compute_consensus(responses: &[ParticipantResponse]) -> Consensus {
    if responses.is_empty() {
        return Consensus {
            verdict: ConsensusVerdict::NoData,
            discrepancy: None,
            values: vec![],
        };
    }

    let values: Vec<String> = responses.iter().map(|r| r.body.clone()).collect();

    if responses.len() == 1 {
        return Consensus {
            verdict: ConsensusVerdict::Insufficient,
            discrepancy: None,
            values,
        };
    }

    let numeric: Option<Vec<f64>> = responses
        .iter()
        .map(|r| parse_numeric_response(&r.body))
        .collect();

    if let Some(nums) = numeric {
        let mean = nums.iter().sum::<f64>() / nums.len() as f64;
        let max_dev = nums.iter().map(|v| (v - mean).abs()).fold(0.0, f64::max);
        let spread_pct = if mean == 0.0 {
            if max_dev == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (max_dev / mean.abs()) * 100.0
        };

        let verdict = if max_dev == 0.0 {
            ConsensusVerdict::Match
        } else if spread_pct <= 1.0 {
            ConsensusVerdict::NearMatch
        } else if spread_pct <= 5.0 {
            ConsensusVerdict::Close
        } else {
            ConsensusVerdict::Disagree
        };

        Consensus {
            verdict,
            discrepancy: Some(spread_pct),
            values,
        }
    } else {
        let normalized: Vec<String> = values.iter().map(|v| v.trim().to_lowercase()).collect();
        let all_equal = normalized.windows(2).all(|w| w[0] == w[1]);
        Consensus {
            verdict: if all_equal {
                ConsensusVerdict::Match
            } else {
                ConsensusVerdict::Disagree
            },
            discrepancy: None,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(values: &[&str]) -> Vec<ParticipantResponse> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ParticipantResponse {
                from: format!("agent-{i}"),
                body: v.to_string(),
                ts: 0,
            })
            .collect()
    }

    #[test]
    fn equal_values_are_a_match() {
        let c = compute_consensus(&responses(&["1250", "1250"]));
        assert_eq!(c.verdict, ConsensusVerdict::Match);
    }

    #[test]
    fn small_spread_is_near_match() {
        let c = compute_consensus(&responses(&["1250", "1260"]));
        assert_eq!(c.verdict, ConsensusVerdict::NearMatch);
    }

    #[test]
    fn large_spread_is_disagree() {
        let c = compute_consensus(&responses(&["1000", "1250"]));
        assert_eq!(c.verdict, ConsensusVerdict::Disagree);
    }

    #[test]
    fn currency_and_thousands_separators_are_tolerated() {
        assert_eq!(parse_numeric_response("$1,250"), Some(1250.0));
        assert_eq!(parse_numeric_response("1,250.50"), Some(1250.50));
    }

    #[test]
    fn non_numeric_equal_strings_match() {
        let c = compute_consensus(&responses(&["Yes", " yes "]));
        assert_eq!(c.verdict, ConsensusVerdict::Match);
    }

    #[test]
    fn non_numeric_disagreeing_strings_disagree() {
        let c = compute_consensus(&responses(&["yes", "no"]));
        assert_eq!(c.verdict, ConsensusVerdict::Disagree);
    }
}

use crate::domain::SpeedRule;

const FALLBACK_RATE: f64 = 8.0;
const FALLBACK_EFFICIENCY: f64 = 1.0;

/// Resolves the production rate for a machine/article pair, preferring the
/// most specific matching [`SpeedRule`] (machine+article > machine+wildcard
/// > wildcard+wildcard). Falls back to a conservative default when no rule
/// matches, per the reference-data error category.
pub struct SpeedService<'a> {
    rules: &'a [SpeedRule],
}

impl<'a> SpeedService<'a> {
    pub fn new(rules: &'a [SpeedRule]) -> Self {
        SpeedService { rules }
    }

    pub fn rate_for(&self, machine_code: &str, article_code: &str) -> (f64, f64) {
        let mut best: Option<&SpeedRule> = None;
        for rule in self.rules {
            let machine_ok = rule.machine_code.as_deref().map_or(true, |c| c == machine_code);
            let article_ok = rule.article_code.as_deref().map_or(true, |a| a == article_code);
            if !machine_ok || !article_ok {
                continue;
            }
            match best {
                Some(b) if b.specificity() >= rule.specificity() => {}
                _ => best = Some(rule),
            }
        }
        match best {
            Some(rule) => (rule.rate_boxes_per_hour, rule.efficiency),
            None => (FALLBACK_RATE, FALLBACK_EFFICIENCY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(machine: Option<&str>, article: Option<&str>, rate: f64) -> SpeedRule {
        SpeedRule {
            machine_code: machine.map(String::from),
            article_code: article.map(String::from),
            rate_boxes_per_hour: rate,
            efficiency: 0.9,
            valid_from: Utc::now(),
            valid_to: None,
        }
    }

    #[test]
    fn most_specific_rule_wins() {
        let rules = vec![rule(None, None, 5.0), rule(Some("M1"), None, 7.0), rule(Some("M1"), Some("ART1"), 9.0)];
        let svc = SpeedService::new(&rules);
        let (rate, _) = svc.rate_for("M1", "ART1");
        assert_eq!(rate, 9.0);
    }

    #[test]
    fn falls_back_when_no_rule_matches() {
        let rules: Vec<SpeedRule> = vec![];
        let svc = SpeedService::new(&rules);
        let (rate, eff) = svc.rate_for("M9", "ARTX");
        assert_eq!(rate, FALLBACK_RATE);
        assert_eq!(eff, FALLBACK_EFFICIENCY);
    }
}

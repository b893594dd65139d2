use std::collections::BTreeSet;

use crate::config::ClassifierRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Recognized(String),
    Unrecognized,
}

impl Classification {
    pub fn category(&self) -> Option<&str> {
        match self {
            Classification::Recognized(category) => Some(category),
            Classification::Unrecognized => None,
        }
    }
}

/// Maps free-text activity names to canonical activity types.
///
/// Rules are tested in order and the first token found as a substring of the
/// lower-cased name decides the category. Tokens overlap, so a more specific
/// token has to be listed before a more general one; reordering the rules
/// reclassifies existing data.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<ClassifierRule>,
}

impl Classifier {
    pub fn new(rules: Vec<ClassifierRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| ClassifierRule {
                token: rule.token.to_lowercase(),
                category: rule.category,
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    pub fn classify(&self, activity_name: &str) -> Classification {
        let name = activity_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| name.contains(rule.token.as_str()))
            .map(|rule| Classification::Recognized(rule.category.clone()))
            .unwrap_or(Classification::Unrecognized)
    }

    /// Lower-cased names that no rule recognizes.
    pub fn unrecognized<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.classify(name) == Classification::Unrecognized)
            .map(str::to_lowercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn default_rules_classify_production_names() {
        let classifier = EngineConfig::default().classifier();
        assert_eq!(
            classifier.classify("Avaliação do Módulo II").category(),
            Some("Module Activities")
        );
        assert_eq!(
            classifier.classify("ATIVIDADE 1 - Diagnóstico").category(),
            Some("Module Activities")
        );
        assert_eq!(
            classifier.classify("Plano de Estudos individual").category(),
            Some("Study and Reading")
        );
        assert_eq!(
            classifier.classify("Portfólio final").category(),
            Some("Final Activity")
        );
        assert_eq!(classifier.classify("Questionário"), Classification::Unrecognized);
    }

    #[test]
    fn earliest_rule_wins_when_tokens_overlap() {
        let name = "Avaliação do portfólio";
        let forward = Classifier::new(vec![
            ClassifierRule::new("avaliação", "Module Activities"),
            ClassifierRule::new("portfólio", "Final Activity"),
        ]);
        let reversed = Classifier::new(vec![
            ClassifierRule::new("portfólio", "Final Activity"),
            ClassifierRule::new("avaliação", "Module Activities"),
        ]);
        assert_eq!(forward.classify(name).category(), Some("Module Activities"));
        assert_eq!(reversed.classify(name).category(), Some("Final Activity"));
        for _ in 0..10 {
            assert_eq!(forward.classify(name).category(), Some("Module Activities"));
        }
    }

    #[test]
    fn upper_case_tokens_still_match() {
        let classifier = Classifier::new(vec![ClassifierRule::new("FÓRUM", "Forums")]);
        assert_eq!(classifier.classify("Fórum de apresentação").category(), Some("Forums"));
    }

    #[test]
    fn collects_unrecognized_names_lower_cased() {
        let classifier = EngineConfig::default().classifier();
        let unknown = classifier.unrecognized(["Quiz 1", "Portfólio", "quiz 1", "Enquete"]);
        assert_eq!(
            unknown.into_iter().collect::<Vec<_>>(),
            vec!["enquete".to_string(), "quiz 1".to_string()]
        );
    }
}

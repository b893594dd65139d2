use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::Classifier;
use crate::error::{EngineError, EngineResult};
use crate::normalize::RegionMatcher;

/// Substring token mapped to a canonical activity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub token: String,
    pub category: String,
}

impl ClassifierRule {
    pub fn new(token: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            category: category.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionRule {
    /// Trimmed name starts with `prefix`; the next `code_len` characters are the code.
    Prefix { prefix: String, code_len: usize },
    /// Case-insensitive whole word anywhere in the name.
    Token { token: String, code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequirement {
    pub category: String,
    /// Hours credited when the category is fully completed.
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_per_item: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_required: Option<f64>,
    #[serde(default)]
    pub minimum_items: u32,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default = "default_true")]
    pub counts_toward_frequency: bool,
}

fn default_true() -> bool {
    true
}

impl ActivityRequirement {
    pub fn new(category: impl Into<String>, hours: f64) -> Self {
        Self {
            category: category.into(),
            hours,
            hours_per_item: None,
            items_required: None,
            minimum_items: 0,
            mandatory: false,
            counts_toward_frequency: true,
        }
    }

    pub fn per_item(mut self, hours_per_item: f64, minimum_items: u32) -> Self {
        self.hours_per_item = Some(hours_per_item);
        self.minimum_items = minimum_items;
        self
    }

    pub fn requiring(mut self, items_required: f64) -> Self {
        self.items_required = Some(items_required);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn not_counting(mut self) -> Self {
        self.counts_toward_frequency = false;
        self
    }

    /// Explicit override, else full hours over hours per item (one hour when unset).
    pub fn items_required(&self) -> f64 {
        if let Some(items) = self.items_required {
            return items;
        }
        match self.hours_per_item {
            Some(per_item) if per_item > 0.0 => self.hours / per_item,
            _ => self.hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationRules {
    pub hour_threshold: f64,
    pub mandatory_category: String,
    pub program_hours: f64,
}

impl Default for CertificationRules {
    fn default() -> Self {
        Self {
            hour_threshold: 90.0,
            mandatory_category: FINAL_ACTIVITY.to_string(),
            program_hours: 120.0,
        }
    }
}

/// When a user who has logged in before counts as inactive. `None` keeps
/// only "never accessed" as the inactive bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_after_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHours {
    pub module: String,
    pub hours: f64,
}

impl ModuleHours {
    pub fn new(module: impl Into<String>, hours: f64) -> Self {
        Self {
            module: module.into(),
            hours,
        }
    }
}

/// Module hours shared by a set of region codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionModuleHours {
    pub regions: Vec<String>,
    pub modules: Vec<ModuleHours>,
}

/// How the program hours split across modules in each region, and the share
/// of a module's hours a student has to reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSchedule {
    pub minimum_share: f64,
    pub by_region: Vec<RegionModuleHours>,
    /// Used for any region no entry lists, unknown regions included.
    pub fallback: Vec<ModuleHours>,
}

fn module_list(hours: [f64; 7]) -> Vec<ModuleHours> {
    let names = [
        "Módulo I",
        "Módulo II",
        "Módulo III",
        "Módulo IV",
        "Módulo V",
        "Módulo VI",
        "Atividade Final",
    ];
    names
        .into_iter()
        .zip(hours)
        .map(|(module, hours)| ModuleHours::new(module, hours))
        .collect()
}

impl Default for ModuleSchedule {
    fn default() -> Self {
        let maranhao = module_list([14.0, 24.0, 14.0, 14.0, 21.0, 10.0, 23.0]);
        Self {
            minimum_share: 0.75,
            by_region: vec![
                RegionModuleHours {
                    regions: vec!["CE".to_string()],
                    modules: module_list([24.0, 14.0, 24.0, 14.0, 11.0, 10.0, 23.0]),
                },
                RegionModuleHours {
                    regions: vec!["PE".to_string(), "PI".to_string()],
                    modules: module_list([14.0, 24.0, 14.0, 24.0, 11.0, 10.0, 23.0]),
                },
                RegionModuleHours {
                    regions: vec!["MA".to_string()],
                    modules: maranhao.clone(),
                },
            ],
            fallback: maranhao,
        }
    }
}

impl ModuleSchedule {
    pub fn modules_for(&self, region_code: &str) -> &[ModuleHours] {
        self.by_region
            .iter()
            .find(|entry| entry.regions.iter().any(|r| r.eq_ignore_ascii_case(region_code)))
            .map(|entry| entry.modules.as_slice())
            .unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub certification: CertificationRules,
    #[serde(default)]
    pub inactivity: InactivityPolicy,
    #[serde(default)]
    pub region_names: BTreeMap<String, String>,
    #[serde(default)]
    pub module_hours: ModuleSchedule,
    pub classifier: Vec<ClassifierRule>,
    pub regions: Vec<RegionRule>,
    pub requirements: Vec<ActivityRequirement>,
}

pub const FINAL_ACTIVITY: &str = "Final Activity";

impl Default for EngineConfig {
    fn default() -> Self {
        let region_names = [
            ("CE", "CEARÁ"),
            ("MA", "MARANHÃO"),
            ("PI", "PIAUÍ"),
            ("PE", "PERNAMBUCO"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        let mut regions = vec![RegionRule::Prefix {
            prefix: "[NF".to_string(),
            code_len: 2,
        }];
        regions.extend(["CE", "MA", "PI", "PE"].into_iter().map(|code| RegionRule::Token {
            token: code.to_string(),
            code: code.to_string(),
        }));

        Self {
            certification: CertificationRules::default(),
            inactivity: InactivityPolicy::default(),
            region_names,
            module_hours: ModuleSchedule::default(),
            classifier: vec![
                ClassifierRule::new("avaliação", "Module Activities"),
                ClassifierRule::new("atividade 1", "Module Activities"),
                ClassifierRule::new("plano de estudos", "Study and Reading"),
                ClassifierRule::new("portfólio", FINAL_ACTIVITY),
            ],
            regions,
            requirements: vec![
                ActivityRequirement::new("In-person Meetings", 20.0).per_item(10.0, 1),
                ActivityRequirement::new("Webinars", 15.0).per_item(3.0, 4),
                ActivityRequirement::new("Module Activities", 20.0).per_item(4.0, 3),
                ActivityRequirement::new("Synchronous Meetings", 12.0).per_item(2.0, 5),
                ActivityRequirement::new("Forums", 12.0).per_item(2.0, 5),
                ActivityRequirement::new(FINAL_ACTIVITY, 21.0).mandatory(),
                ActivityRequirement::new("Study and Reading", 20.0).not_counting(),
            ],
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = BTreeSet::new();
        for requirement in &self.requirements {
            if !seen.insert(requirement.category.as_str()) {
                return Err(EngineError::Config(format!(
                    "category `{}` is configured twice",
                    requirement.category
                )));
            }
            if requirement.hours < 0.0 {
                return Err(EngineError::Config(format!(
                    "category `{}` has negative hours",
                    requirement.category
                )));
            }
            if matches!(requirement.hours_per_item, Some(per_item) if per_item <= 0.0) {
                return Err(EngineError::Config(format!(
                    "category `{}` needs positive hours per item",
                    requirement.category
                )));
            }
            if matches!(requirement.items_required, Some(items) if items < 0.0) {
                return Err(EngineError::Config(format!(
                    "category `{}` has negative required items",
                    requirement.category
                )));
            }
        }

        if !seen.contains(self.certification.mandatory_category.as_str()) {
            return Err(EngineError::Config(format!(
                "mandatory category `{}` has no requirement entry",
                self.certification.mandatory_category
            )));
        }

        let schedule = &self.module_hours;
        if !(schedule.minimum_share > 0.0 && schedule.minimum_share <= 1.0) {
            return Err(EngineError::Config(format!(
                "module minimum share {} is outside (0, 1]",
                schedule.minimum_share
            )));
        }
        let module_tables = schedule
            .by_region
            .iter()
            .map(|entry| entry.modules.as_slice())
            .chain([schedule.fallback.as_slice()]);
        for modules in module_tables {
            if let Some(module) = modules.iter().find(|m| m.hours < 0.0) {
                return Err(EngineError::Config(format!(
                    "module `{}` has negative hours",
                    module.module
                )));
            }
        }

        for rule in &self.classifier {
            if rule.token.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "empty classifier token for `{}`",
                    rule.category
                )));
            }
            if !seen.contains(rule.category.as_str()) {
                log::warn!(
                    "classifier token `{}` maps to `{}`, which has no requirement entry",
                    rule.token,
                    rule.category
                );
            }
        }

        Ok(())
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.classifier.clone())
    }

    pub fn region_matcher(&self) -> RegionMatcher {
        RegionMatcher::new(self.regions.clone())
    }

    pub fn requirement(&self, category: &str) -> Option<&ActivityRequirement> {
        self.requirements.iter().find(|r| r.category == category)
    }

    pub fn region_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.region_names.get(code).map(String::as_str).unwrap_or(code)
    }
}

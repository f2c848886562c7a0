use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which kind of Power BI page a tab shows, and so which routine applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    SemanticModel,
    Report,
    Unknown,
}

impl PageKind {
    /// Kinds that have a refresh schedule
    pub const SCHEDULED: [PageKind; 2] = [PageKind::SemanticModel, PageKind::Report];

    /// Classify by URL: `/datasets/` pages are semantic models, `/reports/` pages are reports
    pub fn detect(url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        if url.contains("datasets") {
            PageKind::SemanticModel
        } else if url.contains("report") {
            PageKind::Report
        } else {
            PageKind::Unknown
        }
    }

    /// Prefix of this kind's keys in the settings store
    pub fn key_prefix(self) -> &'static str {
        match self {
            PageKind::SemanticModel => "semantic_model",
            PageKind::Report => "report",
            PageKind::Unknown => "unknown",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::SemanticModel => "semantic-model",
            PageKind::Report => "report",
            PageKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic-model" | "semantic_model" | "model" | "dataset" => Ok(PageKind::SemanticModel),
            "report" => Ok(PageKind::Report),
            other => Err(format!(
                "unknown page kind '{other}' (expected 'semantic-model' or 'report')"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kind_from_service_urls() {
        assert_eq!(
            PageKind::detect("https://app.powerbi.com/groups/me/datasets/1f2e/details?experience=power-bi"),
            PageKind::SemanticModel
        );
        assert_eq!(
            PageKind::detect("https://app.powerbi.com/groups/me/reports/9a8b/ReportSection"),
            PageKind::Report
        );
        assert_eq!(PageKind::detect("https://app.powerbi.com/home"), PageKind::Unknown);
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("Semantic-Model".parse::<PageKind>(), Ok(PageKind::SemanticModel));
        assert_eq!("report".parse::<PageKind>(), Ok(PageKind::Report));
        assert!("unknown".parse::<PageKind>().is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Buy,
    Sell,
    Hold,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Buy => "BUY",
            Verdict::Sell => "SELL",
            Verdict::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Verdict::Buy),
            "SELL" => Ok(Verdict::Sell),
            "HOLD" => Ok(Verdict::Hold),
            other => anyhow::bail!("unknown verdict token: {other}"),
        }
    }
}

/// The investment advisor's output, split into the sections it was asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    pub executive_summary: String,
    pub competitive_moat: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub company_name: String,
    pub financial: String,
    pub strategic: String,
    pub synthesis: Synthesis,
    pub verdict: Verdict,
    pub generated_at: DateTime<Utc>,
    /// Rendered Markdown. Display and both downloads serve this verbatim.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parses_case_insensitively() {
        assert_eq!("buy".parse::<Verdict>().unwrap(), Verdict::Buy);
        assert_eq!(" Hold ".parse::<Verdict>().unwrap(), Verdict::Hold);
        assert!("STRONG BUY".parse::<Verdict>().is_err());
    }

    #[test]
    fn verdict_serializes_as_token() {
        assert_eq!(serde_json::to_string(&Verdict::Sell).unwrap(), "\"SELL\"");
    }
}

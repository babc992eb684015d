use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::failure::Failure;

/// The event source that invokes a lambda feature. Also the directory name
/// under `app/lambdas/` that groups features of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeTrigger {
    Apigw,
    Ddb,
    Direct,
    Cognito,
    S3,
    Sns,
    Sqs,
    Gql,
    Sfn,
}

impl InvokeTrigger {
    pub const ALL: [InvokeTrigger; 9] = [
        InvokeTrigger::Apigw,
        InvokeTrigger::Ddb,
        InvokeTrigger::Direct,
        InvokeTrigger::Cognito,
        InvokeTrigger::S3,
        InvokeTrigger::Sns,
        InvokeTrigger::Sqs,
        InvokeTrigger::Gql,
        InvokeTrigger::Sfn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apigw => "apigw",
            Self::Ddb => "ddb",
            Self::Direct => "direct",
            Self::Cognito => "cognito",
            Self::S3 => "s3",
            Self::Sns => "sns",
            Self::Sqs => "sqs",
            Self::Gql => "gql",
            Self::Sfn => "sfn",
        }
    }
}

impl fmt::Display for InvokeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvokeTrigger {
    type Err = Failure;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        InvokeTrigger::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == value)
            .ok_or_else(|| Failure::validation(format!("lambda trigger ({value}) is not supported")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_trigger() {
        for trigger in InvokeTrigger::ALL {
            assert_eq!(trigger.as_str().parse::<InvokeTrigger>().expect("known"), trigger);
        }
    }

    #[test]
    fn rejects_unknown_trigger() {
        let error = "kinesis".parse::<InvokeTrigger>().expect_err("unsupported");
        assert!(error.to_string().contains("kinesis"));
    }

    #[test]
    fn serializes_lowercase() {
        let value = serde_json::to_string(&InvokeTrigger::Cognito).expect("serialize");
        assert_eq!(value, "\"cognito\"");
    }
}

//! Resource naming: AWS regions, environment prefixes and service names.
//!
//! Every resource a service owns is named `<region_code>-<env>-<label>`, for
//! example `use1-dev-orders`. The qualified service name doubles as the
//! parameter store root (the "app title") for that service.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::failure::Failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Region {
    #[default]
    #[serde(rename = "us-east-1")]
    UsEast1,
    #[serde(rename = "us-east-2")]
    UsEast2,
    #[serde(rename = "us-west-1")]
    UsWest1,
    #[serde(rename = "us-west-2")]
    UsWest2,
    #[serde(rename = "af-south-1")]
    AfSouth1,
    #[serde(rename = "ap-east-1")]
    ApEast1,
    #[serde(rename = "ap-south-1")]
    ApSouth1,
    #[serde(rename = "ap-northeast-1")]
    ApNortheast1,
    #[serde(rename = "ap-northeast-2")]
    ApNortheast2,
    #[serde(rename = "ap-northeast-3")]
    ApNortheast3,
    #[serde(rename = "ap-southeast-1")]
    ApSoutheast1,
    #[serde(rename = "ap-southeast-2")]
    ApSoutheast2,
    #[serde(rename = "ca-central-1")]
    CaCentral1,
    #[serde(rename = "eu-central-1")]
    EuCentral1,
    #[serde(rename = "eu-west-1")]
    EuWest1,
    #[serde(rename = "eu-west-2")]
    EuWest2,
    #[serde(rename = "eu-west-3")]
    EuWest3,
    #[serde(rename = "eu-south-1")]
    EuSouth1,
    #[serde(rename = "eu-north-1")]
    EuNorth1,
    #[serde(rename = "me-south-1")]
    MeSouth1,
    #[serde(rename = "sa-east-1")]
    SaEast1,
    #[serde(rename = "us-gov-east-1")]
    UsGovEast1,
    #[serde(rename = "us-gov-west-1")]
    UsGovWest1,
}

impl Region {
    pub const ALL: [Region; 23] = [
        Region::UsEast1,
        Region::UsEast2,
        Region::UsWest1,
        Region::UsWest2,
        Region::AfSouth1,
        Region::ApEast1,
        Region::ApSouth1,
        Region::ApNortheast1,
        Region::ApNortheast2,
        Region::ApNortheast3,
        Region::ApSoutheast1,
        Region::ApSoutheast2,
        Region::CaCentral1,
        Region::EuCentral1,
        Region::EuWest1,
        Region::EuWest2,
        Region::EuWest3,
        Region::EuSouth1,
        Region::EuNorth1,
        Region::MeSouth1,
        Region::SaEast1,
        Region::UsGovEast1,
        Region::UsGovWest1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsEast1 => "us-east-1",
            Self::UsEast2 => "us-east-2",
            Self::UsWest1 => "us-west-1",
            Self::UsWest2 => "us-west-2",
            Self::AfSouth1 => "af-south-1",
            Self::ApEast1 => "ap-east-1",
            Self::ApSouth1 => "ap-south-1",
            Self::ApNortheast1 => "ap-northeast-1",
            Self::ApNortheast2 => "ap-northeast-2",
            Self::ApNortheast3 => "ap-northeast-3",
            Self::ApSoutheast1 => "ap-southeast-1",
            Self::ApSoutheast2 => "ap-southeast-2",
            Self::CaCentral1 => "ca-central-1",
            Self::EuCentral1 => "eu-central-1",
            Self::EuWest1 => "eu-west-1",
            Self::EuWest2 => "eu-west-2",
            Self::EuWest3 => "eu-west-3",
            Self::EuSouth1 => "eu-south-1",
            Self::EuNorth1 => "eu-north-1",
            Self::MeSouth1 => "me-south-1",
            Self::SaEast1 => "sa-east-1",
            Self::UsGovEast1 => "us-gov-east-1",
            Self::UsGovWest1 => "us-gov-west-1",
        }
    }

    /// Compressed form used in resource names: `us-east-1` becomes `use1`,
    /// `ap-southeast-2` becomes `apse2`, `us-gov-west-1` becomes `usgw1`.
    pub fn code(self) -> String {
        region_code(self.as_str())
    }
}

fn region_code(region: &str) -> String {
    let parts: Vec<&str> = region.split('-').collect();
    let Some((first, rest)) = parts.split_first() else {
        return String::new();
    };
    let Some((number, middle)) = rest.split_last() else {
        return String::new();
    };

    let mut code = (*first).to_string();
    for part in middle {
        code.push_str(compass_abbreviation(part));
    }
    code.push_str(number);
    code
}

fn compass_abbreviation(part: &str) -> &str {
    match part {
        "northeast" => "ne",
        "northwest" => "nw",
        "southeast" => "se",
        "southwest" => "sw",
        other => other.get(..1).unwrap_or(""),
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Failure;

    /// Accepts either the AWS name (`us-east-1`) or its code (`use1`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Region::ALL
            .into_iter()
            .find(|region| region.as_str() == value || region.code() == value)
            .ok_or_else(|| Failure::validation(format!("aws region ({value}) is not mapped")))
    }
}

/// `<region_code>-<env>`, the leading part of every resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Prefix {
    region: Region,
    env: String,
}

impl Prefix {
    pub fn new(region: Region, env: impl Into<String>) -> Result<Self, Failure> {
        let env = env.into();
        if env.trim().is_empty() {
            return Err(Failure::validation("application environment is empty"));
        }
        Ok(Self { region, env })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn env(&self) -> &str {
        &self.env
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.region.code(), self.env)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceName {
    prefix: Prefix,
    label: String,
}

impl ServiceName {
    pub fn new(prefix: Prefix, label: impl Into<String>) -> Result<Self, Failure> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(Failure::validation("service label is empty"));
        }
        Ok(Self { prefix, label })
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.prefix, self.label)
    }

    /// Root path segment under which the service's parameters are stored.
    pub fn app_title(&self) -> String {
        self.qualified_name()
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

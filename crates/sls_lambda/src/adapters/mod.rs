pub mod deploy;
pub mod ssm;

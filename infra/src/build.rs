//! Compiles a feature with cargo and packages it as a Lambda zip.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use sls_core::service::{CodeLayout, Feature, FEATURE_MANIFEST_FILE};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cli::BuildProfile;
use crate::error::CliError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub manifest_path: PathBuf,
    pub bin_name: String,
    pub target: String,
    pub profile: BuildProfile,
    pub target_dir: PathBuf,
    /// Name of the executable inside the zip; the provided runtime expects
    /// `bootstrap`.
    pub entry_name: String,
    pub zip_path: PathBuf,
}

impl BuildSettings {
    pub fn for_feature(
        layout: &CodeLayout,
        feature: &Feature,
        target: &str,
        profile: BuildProfile,
    ) -> Self {
        let build_dir = layout.build_dir();
        Self {
            manifest_path: layout
                .lambdas_dir()
                .join(feature.code_dir())
                .join(FEATURE_MANIFEST_FILE),
            bin_name: feature.name.clone(),
            target: target.to_string(),
            profile,
            target_dir: build_dir.join("target"),
            entry_name: feature.binary_name.clone(),
            zip_path: build_dir.join(&feature.name).join(&feature.zip_name),
        }
    }

    pub fn cargo_args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--manifest-path".to_string(),
            self.manifest_path.display().to_string(),
            "--bin".to_string(),
            self.bin_name.clone(),
            "--target".to_string(),
            self.target.clone(),
            "--target-dir".to_string(),
            self.target_dir.display().to_string(),
        ];
        if let Some(flag) = self.profile.as_cargo_flag() {
            args.push(flag.to_string());
        }
        args
    }

    pub fn binary_path(&self) -> PathBuf {
        self.target_dir
            .join(&self.target)
            .join(self.profile.dir_name())
            .join(binary_name(&self.bin_name, &self.target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub zip_path: PathBuf,
    pub zip_data: Vec<u8>,
}

/// Produces the deployment package of a feature.
pub trait Packager {
    fn package(&self, settings: &BuildSettings) -> Result<BuildResult, CliError>;
}

/// Builds with the `cargo` found on `PATH`.
pub struct CargoPackager;

impl Packager for CargoPackager {
    fn package(&self, settings: &BuildSettings) -> Result<BuildResult, CliError> {
        compile(settings)?;
        let zip_data = package_lambda_zip(
            &settings.binary_path(),
            &settings.zip_path,
            &settings.entry_name,
        )?;
        Ok(BuildResult {
            zip_path: settings.zip_path.clone(),
            zip_data,
        })
    }
}

fn compile(settings: &BuildSettings) -> Result<(), CliError> {
    let args = settings.cargo_args();
    info!(command = %format!("cargo {}", args.join(" ")), "building feature");

    let status = Command::new("cargo")
        .args(&args)
        .status()
        .map_err(|e| CliError::io("failed to execute cargo", &settings.manifest_path, e))?;
    if !status.success() {
        return Err(CliError::Build {
            args: args.join(" "),
            status: status.to_string(),
        });
    }
    Ok(())
}

pub fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

/// Zips `binary_path` as an executable `entry_name` into `zip_path` and
/// returns the archive bytes.
pub fn package_lambda_zip(
    binary_path: &Path,
    zip_path: &Path,
    entry_name: &str,
) -> Result<Vec<u8>, CliError> {
    let binary = fs::read(binary_path)
        .map_err(|e| CliError::io("failed to read lambda binary", binary_path, e))?;
    if let Some(dir) = zip_path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| CliError::io("failed to create lambda dist directory", dir, e))?;
    }

    let file = fs::File::create(zip_path)
        .map_err(|e| CliError::io("failed to create lambda zip", zip_path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file(entry_name, options)?;
    zip.write_all(&binary)
        .map_err(|e| CliError::io("failed to write bootstrap entry", zip_path, e))?;
    zip.finish()?;

    let data =
        fs::read(zip_path).map_err(|e| CliError::io("failed to read lambda zip", zip_path, e))?;
    info!(zip = %zip_path.display(), bytes = data.len(), "packaged lambda");
    Ok(data)
}

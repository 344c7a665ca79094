//! Host package-manager bridge
//!
//! Shells out to the native package tool for `distro:` manifest entries.
//! Distro packages are opaque to the core: they never enter the store or a
//! profile generation, only the declarative manifest.

use std::process::Command;

use crate::error::{Error, Result};

/// Supported host package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroPm {
    Apt,
    Dnf,
    Pacman,
    Zypper,
}

impl DistroPm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistroPm::Apt => "apt",
            DistroPm::Dnf => "dnf",
            DistroPm::Pacman => "pacman",
            DistroPm::Zypper => "zypper",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "apt" | "apt-get" => Some(DistroPm::Apt),
            "dnf" | "yum" => Some(DistroPm::Dnf),
            "pacman" => Some(DistroPm::Pacman),
            "zypper" => Some(DistroPm::Zypper),
            _ => None,
        }
    }

    /// Detect the host's package manager by tool availability.
    pub fn detect() -> Option<Self> {
        for pm in [DistroPm::Apt, DistroPm::Dnf, DistroPm::Pacman, DistroPm::Zypper] {
            if which::which(pm.tool()).is_ok() {
                return Some(pm);
            }
        }
        None
    }

    fn tool(&self) -> &'static str {
        match self {
            DistroPm::Apt => "apt-get",
            DistroPm::Dnf => "dnf",
            DistroPm::Pacman => "pacman",
            DistroPm::Zypper => "zypper",
        }
    }

    fn install_args(&self, package: &str) -> Vec<String> {
        match self {
            DistroPm::Apt => vec!["install".into(), "-y".into(), package.into()],
            DistroPm::Dnf => vec!["install".into(), "-y".into(), package.into()],
            DistroPm::Pacman => vec!["-S".into(), "--noconfirm".into(), package.into()],
            DistroPm::Zypper => vec![
                "--non-interactive".into(),
                "install".into(),
                package.into(),
            ],
        }
    }

    fn remove_args(&self, package: &str) -> Vec<String> {
        match self {
            DistroPm::Apt => vec!["remove".into(), "-y".into(), package.into()],
            DistroPm::Dnf => vec!["remove".into(), "-y".into(), package.into()],
            DistroPm::Pacman => vec!["-R".into(), "--noconfirm".into(), package.into()],
            DistroPm::Zypper => vec![
                "--non-interactive".into(),
                "remove".into(),
                package.into(),
            ],
        }
    }

    pub fn install(&self, package: &str) -> Result<()> {
        tracing::info!("installing '{}' via {}", package, self.as_str());
        self.run(&self.install_args(package))
    }

    pub fn remove(&self, package: &str) -> Result<()> {
        tracing::info!("removing '{}' via {}", package, self.as_str());
        self.run(&self.remove_args(package))
    }

    fn run(&self, args: &[String]) -> Result<()> {
        // Package tools need root; the tool itself prompts when sudo asks
        // for a password.
        let status = Command::new("sudo").arg(self.tool()).args(args).status()?;
        if !status.success() {
            return Err(Error::Distro(format!(
                "{} exited with {}",
                self.tool(),
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }
}

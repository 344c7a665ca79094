//! Build execution
//!
//! Runs a recipe's build and install commands in a scoped build directory
//! with an empty install prefix. When bubblewrap is available and sandboxing
//! is requested, each command runs with networking unshared and the
//! filesystem read-only outside the build directory; otherwise execution
//! falls back to the plain shell with a warning.

use std::path::{Path, PathBuf};
use std::process::Command;

use pygr_meta::Recipe;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::utils::copy_dir_recursive;

/// Literal token substituted with the install prefix in recipe commands
const PREFIX_TOKEN: &str = "{{prefix}}";

/// Result of a build: the install prefix, kept alive by the build dir guard
/// until the store has copied it out.
#[derive(Debug)]
pub struct BuildOutput {
    _guard: TempDir,
    pub prefix: PathBuf,
}

pub struct Builder {
    sandbox: bool,
}

impl Builder {
    pub fn new(sandbox: bool) -> Self {
        Self { sandbox }
    }

    /// Build `recipe` from `source_dir`, with the store paths of its already
    /// built dependencies on `PATH`. Returns the populated install prefix.
    pub fn build(
        &self,
        recipe: &Recipe,
        source_dir: &Path,
        dep_paths: &[PathBuf],
    ) -> Result<BuildOutput> {
        let build_root = tempfile::Builder::new().prefix("pygr-build-").tempdir()?;

        let work_dir = build_root.path().join("src");
        copy_dir_recursive(source_dir, &work_dir)?;

        let prefix = build_root.path().join("install-root");
        std::fs::create_dir_all(&prefix)?;

        let path_var = compose_path(dep_paths);
        let bwrap = self.sandbox_tool();

        for command in recipe.build.iter().chain(recipe.install.iter()) {
            let command = command.replace(PREFIX_TOKEN, &prefix.to_string_lossy());
            tracing::info!("[{}] {}", recipe.name, command);
            run_shell(
                &command,
                &work_dir,
                build_root.path(),
                &path_var,
                bwrap.as_deref(),
            )?;
        }

        Ok(BuildOutput {
            _guard: build_root,
            prefix,
        })
    }

    fn sandbox_tool(&self) -> Option<PathBuf> {
        if !self.sandbox {
            return None;
        }
        match which::which("bwrap") {
            Ok(path) => Some(path),
            Err(_) => {
                tracing::warn!("bwrap not found; running build commands without isolation");
                None
            }
        }
    }
}

/// Prefix `PATH` with the `bin/` directory of every dependency that has one.
fn compose_path(dep_paths: &[PathBuf]) -> String {
    let mut parts: Vec<String> = dep_paths
        .iter()
        .map(|p| p.join("bin"))
        .filter(|p| p.is_dir())
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if let Ok(path) = std::env::var("PATH") {
        parts.push(path);
    }
    parts.join(":")
}

fn run_shell(
    command: &str,
    work_dir: &Path,
    build_root: &Path,
    path_var: &str,
    bwrap: Option<&Path>,
) -> Result<()> {
    let status = match bwrap {
        Some(bwrap) => {
            let build_root = build_root.to_string_lossy();
            let build_root: &str = build_root.as_ref();
            Command::new(bwrap)
                .args([
                    "--ro-bind", "/", "/",
                    "--dev", "/dev",
                    "--proc", "/proc",
                    "--bind", build_root, build_root,
                    "--unshare-net",
                    "--die-with-parent",
                    "--new-session",
                    "sh", "-c", command,
                ])
                .current_dir(work_dir)
                .env("PATH", path_var)
                .status()?
        }
        None => Command::new("sh")
            .args(["-c", command])
            .current_dir(work_dir)
            .env("PATH", path_var)
            .status()?,
    };

    if !status.success() {
        return Err(Error::BuildFailed(format!(
            "command exited with {}: {}",
            status.code().unwrap_or(-1),
            command
        )));
    }

    Ok(())
}

/// Guess build/install command lists for a source tree with no recipe.
///
/// Used by the ad-hoc GitHub install path. Checks are ordered so generated
/// Makefiles do not shadow their generators.
pub fn detect_build_commands(dir: &Path) -> Option<(Vec<String>, Vec<String>)> {
    if dir.join("Cargo.toml").exists() {
        return Some((
            vec![],
            vec!["cargo install --path . --root {{prefix}}".into()],
        ));
    }
    if dir.join("configure").exists() {
        return Some((
            vec!["./configure --prefix={{prefix}}".into(), "make".into()],
            vec!["make install".into()],
        ));
    }
    if dir.join("CMakeLists.txt").exists() {
        return Some((
            vec![
                "cmake -S . -B build -DCMAKE_INSTALL_PREFIX={{prefix}}".into(),
                "cmake --build build".into(),
            ],
            vec!["cmake --install build".into()],
        ));
    }
    if dir.join("Makefile").exists() || dir.join("makefile").exists() {
        return Some((
            vec!["make".into()],
            vec!["make install PREFIX={{prefix}}".into()],
        ));
    }
    if dir.join("go.mod").exists() {
        return Some((
            vec![],
            vec!["GOBIN={{prefix}}/bin go install ./...".into()],
        ));
    }
    if dir.join("package.json").exists() {
        return Some((
            vec![],
            vec!["npm install -g --prefix {{prefix}} .".into()],
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recipe_with_commands(build: &[&str], install: &[&str]) -> Recipe {
        let fmt = |cmds: &[&str]| {
            cmds.iter()
                .map(|c| format!("    - '{}'", c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let mut yaml = String::from(
            "name: pkg\nversion: \"1.0\"\nsource: { type: github, repo: u/p, ref: main }\n",
        );
        if !build.is_empty() {
            yaml.push_str(&format!("build:\n  commands:\n{}\n", fmt(build)));
        }
        if !install.is_empty() {
            yaml.push_str(&format!("install:\n  commands:\n{}\n", fmt(install)));
        }
        Recipe::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_build_substitutes_prefix_and_populates_install_root() {
        let source = tempdir().unwrap();
        std::fs::write(source.path().join("hello.txt"), "hello").unwrap();

        let recipe = recipe_with_commands(
            &["cp hello.txt hello.out"],
            &["mkdir -p {{prefix}}/bin", "cp hello.out {{prefix}}/bin/hello"],
        );

        let builder = Builder::new(false);
        let output = builder.build(&recipe, source.path(), &[]).unwrap();
        assert!(output.prefix.join("bin/hello").is_file());
    }

    #[test]
    fn test_build_failure_aborts() {
        let source = tempdir().unwrap();
        let recipe = recipe_with_commands(&["false"], &[]);

        let builder = Builder::new(false);
        let err = builder.build(&recipe, source.path(), &[]).unwrap_err();
        assert!(matches!(err, Error::BuildFailed(_)));
    }

    #[test]
    fn test_dependency_bins_take_path_precedence() {
        let source = tempdir().unwrap();
        let dep = tempdir().unwrap();
        std::fs::create_dir(dep.path().join("bin")).unwrap();
        std::fs::write(dep.path().join("bin/deptool"), "#!/bin/sh\necho from-dep\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(dep.path().join("bin/deptool"))
                .unwrap()
                .permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(dep.path().join("bin/deptool"), perms).unwrap();
        }

        let recipe = recipe_with_commands(
            &[],
            &["mkdir -p {{prefix}}", "deptool > {{prefix}}/out.txt"],
        );

        let builder = Builder::new(false);
        let output = builder
            .build(&recipe, source.path(), &[dep.path().to_path_buf()])
            .unwrap();
        let out = std::fs::read_to_string(output.prefix.join("out.txt")).unwrap();
        assert_eq!(out.trim(), "from-dep");
    }

    #[test]
    fn test_detect_build_commands() {
        let dir = tempdir().unwrap();
        assert!(detect_build_commands(dir.path()).is_none());

        std::fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let (build, install) = detect_build_commands(dir.path()).unwrap();
        assert_eq!(build, vec!["make"]);
        assert!(install[0].contains("{{prefix}}"));

        // Cargo wins over a checked-in Makefile
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let (_, install) = detect_build_commands(dir.path()).unwrap();
        assert!(install[0].starts_with("cargo install"));
    }
}

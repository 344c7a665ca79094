//! pygr CLI - imperative package operations over a declarative manifest
//!
//! Every imperative action (install, remove) also updates the declarative
//! config so `pygr apply` can rebuild the environment from scratch.

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use pygr::manifest::{DeclarativeConfig, PackageSpec};
use pygr::profile::Profile;
use pygr::transaction::Transaction;
use pygr::types::PygrEnv;
use pygr_cache::Catalog;
use pygr_meta::VersionConstraint;

/// pygr - build GitHub-hosted software into rollback-capable user profiles
#[derive(Parser)]
#[command(name = "pygr")]
#[command(about = "Per-user package manager for GitHub-hosted sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Profile to operate on
    #[arg(long, global = true, default_value = "default")]
    profile: String,

    /// Disable the build sandbox even when bwrap is available
    #[arg(long, global = true)]
    no_sandbox: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages (recipe names, name@version, or owner/repo)
    Install {
        #[arg(required = true)]
        packages: Vec<String>,

        /// Treat the packages as host-native and install them with the
        /// detected distro package manager
        #[arg(long)]
        distro: bool,
    },

    /// Uninstall packages by name and drop them from the manifest
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Upgrade named packages, or everything when no names are given
    Upgrade { packages: Vec<String> },

    /// Search GitHub repositories
    Search {
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Register a recipe repository
    RepoAdd {
        name: String,
        /// Clone URL or owner/name slug
        url: String,
    },

    /// List registered recipe repositories
    RepoList,

    /// List packages in the current profile generation
    List,

    /// Show all generations of the profile
    Generations,

    /// Switch the profile to the previous generation
    Rollback,

    /// Switch the profile to a specific generation
    Switch { generation: u64 },

    /// Write the current profile state to the declarative manifest
    Sync,

    /// Install everything the declarative manifest lists
    Apply,

    /// Back up the config directory
    Backup {
        /// Label appended to the backup directory name
        #[arg(default_value = "manual")]
        label: String,
    },

    /// Show an overview of the pygr environment
    Status,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> pygr::Result<()> {
    let env = PygrEnv::from_env();
    env.bootstrap()?;
    let catalog = Catalog::open(&env.db_path())?;
    let sandbox = !cli.no_sandbox;
    let tx = Transaction::new(&env, &catalog, cli.profile.as_str(), sandbox);

    match cli.command {
        Commands::Install { packages, distro } => {
            if distro {
                let pm = pygr::distro::DistroPm::detect().ok_or_else(|| {
                    pygr::Error::Distro("no supported host package manager found".into())
                })?;
                let config = DeclarativeConfig::new(env.packages_conf());
                for package in &packages {
                    pm.install(package)?;
                    config.add_entry(&format!("distro:{}:{}", pm.as_str(), package))?;
                    println!(
                        "[{}] {} {} (distro)",
                        "+".bright_green().bold(),
                        "installed".bright_green(),
                        package
                    );
                }
                return Ok(());
            }

            let mut recipe_specs: Vec<(String, VersionConstraint)> = Vec::new();
            for package in &packages {
                match PackageSpec::parse_cli(package)? {
                    PackageSpec::GitHub { repo, reference } => {
                        let artifact = tx.install_github(&repo, reference.as_deref())?;
                        println!(
                            "[{}] {} {}@{}",
                            "+".bright_green().bold(),
                            "installed".bright_green(),
                            artifact.name,
                            artifact.version
                        );
                    }
                    PackageSpec::Recipe { name, version } => {
                        let constraint = match version {
                            Some(v) => VersionConstraint::parse(&format!("=={}", v)),
                            None => VersionConstraint::any(),
                        };
                        recipe_specs.push((name, constraint));
                    }
                    PackageSpec::Distro { pm, name } => {
                        // Installing a distro package imperatively goes
                        // through the bridge and lands in the manifest only.
                        match pygr::distro::DistroPm::from_name(&pm) {
                            Some(pm_tool) => pm_tool.install(&name)?,
                            None => {
                                return Err(pygr::Error::Distro(format!(
                                    "unknown package manager '{}'",
                                    pm
                                )))
                            }
                        }
                        let config = DeclarativeConfig::new(env.packages_conf());
                        config.add_entry(&format!("distro:{}:{}", pm, name))?;
                        println!(
                            "[{}] {} {} (distro)",
                            "+".bright_green().bold(),
                            "installed".bright_green(),
                            name
                        );
                    }
                }
            }

            if !recipe_specs.is_empty() {
                let built = tx.install(&recipe_specs)?;
                for artifact in &built {
                    println!(
                        "[{}] {} {}@{}",
                        "+".bright_green().bold(),
                        "installed".bright_green(),
                        artifact.name,
                        artifact.version
                    );
                }
            }
        }

        Commands::Remove { packages } => {
            tx.uninstall(&packages)?;
            for package in &packages {
                println!("[{}] removed {}", "-".bright_red().bold(), package);
            }
        }

        Commands::Upgrade { packages } => {
            let built = tx.upgrade(&packages)?;
            if built.is_empty() {
                println!("Nothing to upgrade.");
            }
            for artifact in &built {
                println!(
                    "[{}] {} {}@{}",
                    "^".bright_blue().bold(),
                    "upgraded".bright_blue(),
                    artifact.name,
                    artifact.version
                );
            }
        }

        Commands::Search { query, limit } => {
            let github = pygr::github::GitHubClient::new();
            let results = github.search(&query, limit)?;
            if results.is_empty() {
                println!("No repositories found for '{}'.", query);
            }
            for repo in results {
                println!(
                    "{} {} {}",
                    repo.full_name.bright_cyan().bold(),
                    format!("★{}", repo.stargazers_count).bright_yellow(),
                    repo.description.unwrap_or_default()
                );
            }
        }

        Commands::RepoAdd { name, url } => {
            let clone_url = if url.contains("://") {
                url.clone()
            } else {
                format!("https://github.com/{}.git", url)
            };
            let dest = env.repos_dir().join(&name);
            if dest.exists() {
                std::fs::remove_dir_all(&dest)?;
            }
            let git = which::which("git")
                .map_err(|_| pygr::Error::ToolNotFound("git".into()))?;
            let status = std::process::Command::new(git)
                .args(["clone", "-q", "--depth", "1"])
                .arg(&clone_url)
                .arg(&dest)
                .status()?;
            if !status.success() {
                return Err(pygr::Error::FetchFailed(format!(
                    "cloning {} failed",
                    clone_url
                )));
            }
            catalog.add_repo(&name, &clone_url, "github")?;
            println!(
                "[{}] registered recipe repo '{}'",
                "+".bright_green().bold(),
                name
            );
        }

        Commands::RepoList => {
            let repos = catalog.list_repos()?;
            if repos.is_empty() {
                println!("No recipe repositories registered.");
            }
            for repo in repos {
                println!("{} {}", repo.name.bright_cyan().bold(), repo.url);
            }
        }

        Commands::List => {
            let profile = Profile::new(&env, &catalog, cli.profile.as_str());
            let (generation, packages) = profile.current_generation()?;
            if packages.is_empty() {
                println!("No packages installed in profile '{}'.", cli.profile);
            } else {
                println!(
                    "Profile '{}' generation {}:",
                    cli.profile.bright_cyan().bold(),
                    generation
                );
                for artifact in catalog.store_packages_for(&packages)? {
                    println!(
                        "  {} {} ({})",
                        artifact.name.bright_cyan(),
                        artifact.version,
                        &artifact.hash[..12.min(artifact.hash.len())]
                    );
                }
            }
        }

        Commands::Generations => {
            let profile = Profile::new(&env, &catalog, cli.profile.as_str());
            let generations = profile.list_generations()?;
            let active = profile.active_generation()?;
            if generations.is_empty() {
                println!("Profile '{}' has no generations.", cli.profile);
            }
            for gen in generations {
                let marker = if gen.generation == active { "*" } else { " " };
                println!(
                    "{} gen-{} ({} packages, {})",
                    marker,
                    gen.generation,
                    gen.packages.len(),
                    gen.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }

        Commands::Rollback => {
            let profile = Profile::new(&env, &catalog, cli.profile.as_str());
            match profile.rollback()? {
                Some(generation) => println!(
                    "[{}] profile '{}' rolled back to generation {}",
                    "<".bright_blue().bold(),
                    cli.profile,
                    generation
                ),
                None => println!("No previous generation to roll back to."),
            }
        }

        Commands::Switch { generation } => {
            let profile = Profile::new(&env, &catalog, cli.profile.as_str());
            profile.switch_to(generation)?;
            println!(
                "[{}] profile '{}' switched to generation {}",
                ">".bright_blue().bold(),
                cli.profile,
                generation
            );
        }

        Commands::Sync => {
            tx.sync()?;
            println!(
                "[{}] manifest synced from profile '{}'",
                "+".bright_green().bold(),
                cli.profile
            );
        }

        Commands::Apply => {
            tx.apply()?;
            println!("[{}] manifest applied", "+".bright_green().bold());
        }

        Commands::Backup { label } => {
            let dest = pygr::backup::backup_config(&env, &label)?;
            println!(
                "[{}] config backed up to {}",
                "+".bright_green().bold(),
                dest.display()
            );
        }

        Commands::Status => {
            let profile = Profile::new(&env, &catalog, cli.profile.as_str());
            let (generation, packages) = profile.current_generation()?;
            let config = DeclarativeConfig::new(env.packages_conf());
            let entries = config.read_entries()?;
            let repos = catalog.list_repos()?;

            println!("{}: {}", "root".bright_cyan(), env.root.display());
            println!(
                "{}: {} (generation {}, {} packages)",
                "profile".bright_cyan(),
                cli.profile,
                generation,
                packages.len()
            );
            println!("{}: {}", "manifest entries".bright_cyan(), entries.len());
            println!("{}: {}", "recipe repos".bright_cyan(), repos.len());
        }
    }

    Ok(())
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".bright_red().bold(), e);
        std::process::exit(1);
    }
}

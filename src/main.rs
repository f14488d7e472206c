// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use steward::catalog::PackageVersion;
use steward::facade::{CommitOutcome, DebFacade, FacadeConfig, LegacyFacade, PackageFacade};
use tracing::info;

/// Backend variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Deb,
    Legacy,
}

#[derive(Parser)]
#[command(name = "steward")]
#[command(author, version, about = "Package transaction engine with canonical identity hashing", long_about = None)]
struct Cli {
    /// Data directory holding the channel list and host state database
    #[arg(long, global = true, default_value = "/var/lib/steward")]
    data_dir: String,

    /// Backend variant to drive
    #[arg(long, global = true, value_enum, default_value_t = Backend::Deb)]
    backend: Backend,

    /// Architecture used when building channel index URLs
    #[arg(long, global = true, default_value = "amd64")]
    arch: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage package channels
    Channels {
        #[command(subcommand)]
        command: ChannelCommands,
    },
    /// Refresh package lists from every channel and rebuild the catalog
    Reload {
        /// Refetch even if a previous load is still cached
        #[arg(long)]
        force: bool,
    },
    /// List known package versions
    Packages {
        /// Name substring to filter by (shows all if omitted)
        pattern: Option<String>,
    },
    /// Print the canonical identity hash of a package
    Hash {
        /// Package name
        name: String,
        /// Specific version (highest candidate if omitted)
        #[arg(long)]
        version: Option<String>,
    },
    /// Install packages (marks and commits in one transaction)
    Install {
        /// Package names
        names: Vec<String>,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        names: Vec<String>,
    },
    /// Upgrade every installed package to its highest candidate
    Upgrade,
    /// Place a hold on installed packages
    Hold {
        /// Package names
        names: Vec<String>,
    },
    /// Release holds
    Unhold {
        /// Package names
        names: Vec<String>,
    },
    /// Show backend, channel, and host state summary
    Status,
}

#[derive(Subcommand)]
enum ChannelCommands {
    /// List configured channels
    List,
    /// Add an apt-style channel
    Add {
        /// Repository base URL
        url: String,
        /// Distribution name
        distribution: String,
        /// Components (e.g. main universe)
        components: Vec<String>,
    },
    /// Add a local directory channel holding a Packages file
    AddDir {
        /// Directory path
        path: String,
    },
    /// Remove all channels
    Clear,
}

/// The two variants behind one dispatch point. Inherent helpers
/// (installed listing, reload timestamp) are not part of the facade
/// trait, so the binary keeps the concrete types around.
enum AnyFacade {
    Deb(DebFacade),
    Legacy(LegacyFacade),
}

impl AnyFacade {
    fn open(backend: Backend, config: FacadeConfig) -> Result<Self> {
        Ok(match backend {
            Backend::Deb => Self::Deb(DebFacade::open(config)?),
            Backend::Legacy => Self::Legacy(LegacyFacade::open(config)?),
        })
    }

    fn facade(&mut self) -> &mut dyn PackageFacade {
        match self {
            Self::Deb(f) => f,
            Self::Legacy(f) => f,
        }
    }

    fn facade_ref(&self) -> &dyn PackageFacade {
        match self {
            Self::Deb(f) => f,
            Self::Legacy(f) => f,
        }
    }

    fn installed_packages(&self) -> steward::Result<Vec<(String, String)>> {
        match self {
            Self::Deb(f) => f.installed_packages(),
            Self::Legacy(f) => f.installed_packages(),
        }
    }

    fn last_reload(&self) -> steward::Result<Option<String>> {
        match self {
            Self::Deb(f) => f.last_reload(),
            Self::Legacy(f) => f.last_reload(),
        }
    }
}

/// Highest candidate version of `name`, if the catalog knows it.
fn candidate_version(facade: &dyn PackageFacade, name: &str) -> Result<PackageVersion> {
    facade
        .get_packages_by_name(name)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No package named {} in the catalog", name))
}

/// Installed version of `name`, as a catalog identity.
fn installed_version(any: &AnyFacade, name: &str) -> Result<PackageVersion> {
    let kind = any.facade_ref().kind();
    any.installed_packages()?
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(n, v)| PackageVersion::new(n, v, kind))
        .ok_or_else(|| anyhow::anyhow!("Package {} is not installed", name))
}

fn print_outcome(outcome: CommitOutcome) {
    match outcome {
        CommitOutcome::NoOp => println!("Nothing to do."),
        CommitOutcome::Committed(log) => {
            if !log.is_empty() {
                print!("{}", log);
                if !log.ends_with('\n') {
                    println!();
                }
            }
            println!("Changes committed.");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = FacadeConfig::new(&cli.data_dir).architecture(&cli.arch);
    let mut any = AnyFacade::open(cli.backend, config)?;

    match cli.command {
        Commands::Channels { command } => match command {
            ChannelCommands::List => {
                let channels = any.facade_ref().list_channels();
                if channels.is_empty() {
                    println!("No channels configured.");
                }
                for channel in channels {
                    println!("{}", channel);
                }
            }
            ChannelCommands::Add {
                url,
                distribution,
                components,
            } => {
                any.facade().add_deb_channel(&url, &distribution, &components)?;
                println!("Channel added.");
            }
            ChannelCommands::AddDir { path } => {
                any.facade().add_dir_channel(&path)?;
                println!("Channel added.");
            }
            ChannelCommands::Clear => {
                any.facade().clear_channels()?;
                println!("Channels cleared.");
            }
        },
        Commands::Reload { force } => {
            any.facade().reload_channels(force)?;
            println!("Catalog now has {} package versions.", any.facade_ref().get_packages().len());
        }
        Commands::Packages { pattern } => {
            any.facade().ensure_channels_reloaded()?;
            let facade = any.facade_ref();
            for version in facade.get_packages() {
                if let Some(p) = &pattern {
                    if !version.name.contains(p.as_str()) {
                        continue;
                    }
                }
                let marker = if facade.is_installed(&version) {
                    " [installed]"
                } else {
                    ""
                };
                println!("{}{}", version, marker);
            }
        }
        Commands::Hash { name, version } => {
            any.facade().ensure_channels_reloaded()?;
            let facade = any.facade_ref();
            let target = match version {
                Some(v) => PackageVersion::new(name.clone(), v, facade.kind()),
                None => candidate_version(facade, &name)?,
            };
            let digest = facade
                .get_package_hash(&target)
                .ok_or_else(|| anyhow::anyhow!("No such package version: {}", target))?;
            println!("{}  {}", digest, target);
        }
        Commands::Install { names } => {
            any.facade().ensure_channels_reloaded()?;
            for name in &names {
                let version = candidate_version(any.facade_ref(), name)?;
                info!("Marking {} for installation", version);
                any.facade().mark_install(&version);
            }
            let outcome = any.facade().perform_changes()?;
            print_outcome(outcome);
        }
        Commands::Remove { names } => {
            any.facade().ensure_channels_reloaded()?;
            for name in &names {
                let version = installed_version(&any, name)?;
                info!("Marking {} for removal", version);
                any.facade().mark_remove(&version);
            }
            let outcome = any.facade().perform_changes()?;
            print_outcome(outcome);
        }
        Commands::Upgrade => {
            any.facade().ensure_channels_reloaded()?;
            any.facade().mark_global_upgrade();
            let outcome = any.facade().perform_changes()?;
            print_outcome(outcome);
        }
        Commands::Hold { names } => {
            for name in &names {
                let version = installed_version(&any, name)?;
                any.facade().mark_create_hold(&version)?;
            }
            let outcome = any.facade().perform_changes()?;
            print_outcome(outcome);
        }
        Commands::Unhold { names } => {
            for name in &names {
                let version = installed_version(&any, name)?;
                any.facade().mark_remove_hold(&version)?;
            }
            let outcome = any.facade().perform_changes()?;
            print_outcome(outcome);
        }
        Commands::Status => {
            let facade = any.facade_ref();
            println!("Backend: {:?}", facade.kind());
            println!("Channels: {}", facade.list_channels().len());
            match any.last_reload()? {
                Some(ts) => println!("Last reload: {}", ts),
                None => println!("Last reload: never"),
            }
            let installed = any.installed_packages()?;
            println!("Installed packages: {}", installed.len());
            for (name, version) in installed {
                println!("  {} {}", name, version);
            }
            if any.facade_ref().supports_holds() {
                let holds = any.facade_ref().get_package_holds()?;
                if !holds.is_empty() {
                    println!("Holds: {}", holds.join(", "));
                }
            } else {
                let locks = any.facade_ref().get_package_locks()?;
                if !locks.is_empty() {
                    println!("Locks:");
                    for lock in locks {
                        if lock.relation.is_empty() {
                            println!("  {}", lock.name);
                        } else {
                            println!("  {} {} {}", lock.name, lock.relation, lock.version);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

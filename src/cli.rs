use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dialoguer::Confirm;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Settings;
use crate::error::BoxError;
use crate::game_launcher::{self, LaunchOutcome};
use crate::host::Host;
use crate::launcher::{layout, LoginChannel, INSTALL_PATH_FIELD, LAUNCHER_PATH_FIELD};
use crate::migrate;
use crate::planner::LaunchTarget;
use crate::preferences::{self, GamePreferences};
use crate::probe::{InstallerProbe, SaveLayout};
use crate::registry::RegistryLookup;
use crate::resolver::{self, ResolvedEnvironment};
use crate::update::{RemoteVersionProbe, UpdateChecker};

#[derive(Parser)]
#[command(
    name = "snowbox",
    author,
    version,
    about = "Snowbreak Box - companion launcher for Snowbreak: Containment Zone",
    long_about = "Finds the game installed by any of its launchers, keeps save paths working and starts the game with the arguments it needs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, help = "Quick launch: start the game (or its launcher when an update is pending) and exit")]
    pub quick: bool,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Path to settings file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the detected installation and current preferences")]
    Status {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    #[command(about = "Launch the game")]
    Launch {
        #[arg(long, help = "Login channel (jinshan, bilibili); defaults to the saved one")]
        channel: Option<LoginChannel>,
    },

    #[command(about = "Show or apply a graphics preset")]
    Graphics {
        #[arg(help = "Preset level, 0 restores the game defaults")]
        level: Option<u32>,
    },

    #[command(about = "Turn the content filter on or off")]
    Filter {
        #[arg(value_enum)]
        state: Toggle,
    },

    #[command(about = "Turn the splash screen on or off")]
    Splash {
        #[arg(value_enum)]
        state: Toggle,
    },

    #[command(about = "Set the default login channel")]
    Channel {
        #[arg(help = "jinshan or bilibili")]
        channel: LoginChannel,
    },

    #[command(about = "Exit right after starting the game instead of waiting for it")]
    AutoExit {
        #[arg(value_enum)]
        state: Toggle,
    },

    #[command(about = "Move save data to the standard location")]
    FixSaves {
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Toggle::On
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let mut settings = Settings::load(self.config.as_deref());
        let host = Host::detect(&settings);

        if self.quick {
            return quick_launch(&mut settings, &host).await;
        }

        match self.command.unwrap_or(Commands::Status { json: false }) {
            Commands::Status { json } => handle_status(&mut settings, &host, json).await,
            Commands::Launch { channel } => handle_launch(&mut settings, &host, channel).await,
            Commands::Graphics { level } => handle_graphics(&mut settings, &host, level),
            Commands::Filter { state } => handle_filter(&mut settings, &host, state),
            Commands::Splash { state } => handle_splash(&mut settings, &host, state),
            Commands::Channel { channel } => handle_channel(&mut settings, channel),
            Commands::AutoExit { state } => handle_auto_exit(&mut settings, state),
            Commands::FixSaves { yes } => handle_fix_saves(&mut settings, &host, yes),
        }
    }
}

/// Probes every lineage through the install cache and the system registry.
fn resolve_environment(settings: &mut Settings, host: &Host) -> Result<ResolvedEnvironment> {
    let cache = settings.install_cache();
    let system = host.system_registry();
    let sources: Vec<&dyn RegistryLookup> = vec![&cache, system.as_ref()];
    let probe = InstallerProbe::new(sources, host.local_app_data()).with_paths(host.paths());

    let env = resolver::resolve(probe.probe_all()).context("Cannot use the game installation")?;

    let lineage = env.lineage();
    settings.remember_lookup(
        lineage.launcher_key,
        LAUNCHER_PATH_FIELD,
        &env.launcher_path.to_string_lossy(),
    );
    settings.remember_lookup(lineage.game_key, INSTALL_PATH_FIELD, &env.game_root.to_string_lossy());
    if let Err(e) = settings.save() {
        tracing::warn!("Could not cache install paths: {:#}", e);
    }

    Ok(env)
}

/// Resolves only once the game is known not to be running, so nothing is
/// probed or cached while it holds its files.
fn resolve_when_idle<T>(game_running: impl FnOnce() -> bool, resolve: impl FnOnce() -> Result<T>) -> Result<T> {
    if game_running() {
        return Err(BoxError::GameAlreadyRunning.into());
    }
    resolve()
}

async fn quick_launch(settings: &mut Settings, host: &Host) -> Result<()> {
    let env = resolve_when_idle(game_launcher::is_game_running, || resolve_environment(settings, host))?;

    let mut probe = RemoteVersionProbe::start(&UpdateChecker::new(), &env);
    let outcome = game_launcher::launch(
        &env,
        &mut probe,
        settings.login_channel,
        host.paths(),
        &host.starter(),
    )
    .await?;

    print_launch(&outcome);
    Ok(())
}

async fn handle_launch(settings: &mut Settings, host: &Host, channel: Option<LoginChannel>) -> Result<()> {
    let env = resolve_when_idle(game_launcher::is_game_running, || resolve_environment(settings, host))?;
    let mut probe = RemoteVersionProbe::start(&UpdateChecker::new(), &env);

    if !env.save_path_is_canonical {
        println!(
            "{} Saves are in a non-standard location, run {} to move them",
            "⚠️".yellow(),
            "snowbox fix-saves".bold()
        );
    }

    let channel = channel.unwrap_or(settings.login_channel);
    let outcome = game_launcher::launch(&env, &mut probe, channel, host.paths(), &host.starter()).await?;
    print_launch(&outcome);

    if settings.auto_exit || outcome.plan.target != LaunchTarget::Game {
        return Ok(());
    }

    println!("{}", "⏳ Waiting for the game to exit...".dimmed());
    match game_launcher::wait_for_game_exit(Duration::from_secs(2)).await {
        Some(played) => println!(
            "{} Session ended after {}h {:02}m",
            "🏁".green(),
            played.num_hours(),
            played.num_minutes() % 60
        ),
        None => println!("{} The game never showed up in the process list", "⚠️".yellow()),
    }

    Ok(())
}

fn print_launch(outcome: &LaunchOutcome) {
    match outcome.plan.target {
        LaunchTarget::Game => {
            println!(
                "{} Game started at {} (PID {})",
                "🚀".green(),
                outcome.started_at.with_timezone(&Local).format("%H:%M"),
                outcome.pid
            );
            println!("  {} {}", "Arguments:".dimmed(), outcome.plan.arguments);
        }
        LaunchTarget::Launcher => {
            println!(
                "{} A game update is available, opened {} instead",
                "⬆️".yellow(),
                outcome.plan.executable.display()
            );
        }
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    host: String,
    environment: &'a ResolvedEnvironment,
    last_played: Option<DateTime<Utc>>,
    graphics_profile: u32,
    content_filter_disabled: bool,
    splash_disabled: bool,
    login_channel: LoginChannel,
    auto_exit: bool,
}

async fn handle_status(settings: &mut Settings, host: &Host, json: bool) -> Result<()> {
    let env = resolve_environment(settings, host)?;
    let mut probe = RemoteVersionProbe::start(&UpdateChecker::new(), &env);

    let prefs = GamePreferences::new(&env);
    let stored_profile = settings.graphics_profile;
    let graphics_profile = prefs.graphics_profile(settings);
    if graphics_profile != stored_profile {
        settings.save()?;
    }

    let env = env.with_update_available(probe.wait().await);
    let report = StatusReport {
        host: host.describe(),
        environment: &env,
        last_played: env.last_played().map(DateTime::<Utc>::from),
        graphics_profile,
        content_filter_disabled: prefs.content_filter_disabled(),
        splash_disabled: prefs.splash_disabled(),
        login_channel: settings.login_channel,
        auto_exit: settings.auto_exit,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "❄️ Snowbreak installation".bold().cyan());
    println!("  {:<14} {}", "Launcher:".bold(), env.lineage().name);
    println!("  {:<14} {}", "Executable:".bold(), env.launcher_path.display());
    println!("  {:<14} {}", "Game folder:".bold(), env.game_root.display());
    println!("  {:<14} {}", "Host:".bold(), report.host.dimmed());

    let layout = match env.layout {
        SaveLayout::Standard => "standard".green(),
        SaveLayout::LegacyNoGameSubfolder => "legacy (no game folder)".yellow(),
        SaveLayout::Other => "non-standard".yellow(),
    };
    println!("  {:<14} {} [{}]", "Saves:".bold(), env.save_dir.display(), layout);
    if !env.save_path_is_canonical {
        println!("  {} run {} to move them to {}", "💡".yellow(), "snowbox fix-saves".bold(), env.canonical_save_dir().display());
    }
    if let Some(played) = report.last_played {
        println!("  {:<14} {}", "Last played:".bold(), played.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }

    let version = match &env.local_version {
        Some(version) => version.to_string(),
        None => "unknown".dimmed().to_string(),
    };
    let update = if env.update_available {
        "update available".yellow()
    } else if env.local_version.is_some() {
        "up to date".green()
    } else {
        "not checked".dimmed()
    };
    println!("  {:<14} {} ({})", "Version:".bold(), version, update);

    println!("\n{}", "⚙️ Preferences".bold().cyan());
    println!(
        "  {:<14} {} ({})",
        "Graphics:".bold(),
        graphics_profile,
        preferences::graphics_profile_name(graphics_profile).unwrap_or("unknown")
    );
    println!("  {:<14} {}", "Filter:".bold(), on_off(!report.content_filter_disabled));
    println!("  {:<14} {}", "Splash:".bold(), on_off(!report.splash_disabled));
    println!("  {:<14} {}", "Channel:".bold(), settings.login_channel);
    println!("  {:<14} {}", "Auto exit:".bold(), on_off(settings.auto_exit));

    Ok(())
}

fn on_off(on: bool) -> ColoredString {
    if on { "on".green() } else { "off".red() }
}

fn handle_graphics(settings: &mut Settings, host: &Host, level: Option<u32>) -> Result<()> {
    let env = resolve_environment(settings, host)?;
    let prefs = GamePreferences::new(&env);

    let Some(level) = level else {
        let stored = settings.graphics_profile;
        let current = prefs.graphics_profile(settings);
        if current != stored {
            settings.save()?;
        }

        println!("{}", "🎨 Graphics presets:".bold().cyan());
        for candidate in 0..=preferences::graphics_profile_count() {
            let name = preferences::graphics_profile_name(candidate).unwrap_or("unknown");
            if candidate == current {
                println!("  {} {} {}", "▶".green(), candidate, name.bold());
            } else {
                println!("    {} {}", candidate, name);
            }
        }
        return Ok(());
    };

    prefs.set_graphics_profile(settings, level)?;
    settings.save()?;
    println!(
        "{} Graphics preset {} ({}) applied to {}",
        "✅".green(),
        level,
        preferences::graphics_profile_name(level).unwrap_or("unknown"),
        env.engine_ini().display()
    );
    Ok(())
}

fn handle_filter(settings: &mut Settings, host: &Host, state: Toggle) -> Result<()> {
    let env = resolve_environment(settings, host)?;
    GamePreferences::new(&env).set_content_filter_disabled(!state.is_on())?;
    println!("{} Content filter {}", "✅".green(), on_off(state.is_on()));
    Ok(())
}

fn handle_splash(settings: &mut Settings, host: &Host, state: Toggle) -> Result<()> {
    let env = resolve_environment(settings, host)?;
    GamePreferences::new(&env).set_splash_disabled(!state.is_on())?;
    println!("{} Splash screen {}", "✅".green(), on_off(state.is_on()));
    Ok(())
}

fn handle_channel(settings: &mut Settings, channel: LoginChannel) -> Result<()> {
    settings.login_channel = channel;
    settings.save()?;
    println!("{} Login channel set to {}", "✅".green(), channel.to_string().bold());
    Ok(())
}

fn handle_auto_exit(settings: &mut Settings, state: Toggle) -> Result<()> {
    settings.auto_exit = state.is_on();
    settings.save()?;
    println!("{} Auto exit {}", "✅".green(), on_off(settings.auto_exit));
    Ok(())
}

fn handle_fix_saves(settings: &mut Settings, host: &Host, yes: bool) -> Result<()> {
    let env = resolve_when_idle(game_launcher::is_game_running, || resolve_environment(settings, host))?;

    if env.save_path_is_canonical {
        println!("{} Saves are already at {}", "✅".green(), env.save_dir.display());
        return Ok(());
    }

    let target = layout::canonical_save_dir(&env.game_root);
    println!("{}", "📦 Moving save data".bold().cyan());
    println!("  {:<6} {}", "From:".bold(), env.save_dir.display());
    println!("  {:<6} {}", "To:".bold(), target.display());
    if target.exists() {
        println!(
            "  {} {} will be replaced (per-channel saves in {} are kept)",
            "⚠️".yellow(),
            target.display(),
            layout::CHANNELS_DIR
        );
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("This cannot be undone. Continue?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    let migrated = migrate::migrate(&env)?;
    println!("{} Saves moved to {}", "✅".green(), migrated.save_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_game_stops_before_resolution() {
        let mut resolved = false;
        let err = resolve_when_idle(
            || true,
            || {
                resolved = true;
                Ok(())
            },
        )
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<BoxError>(), Some(BoxError::GameAlreadyRunning)));
        assert!(!resolved);
    }

    #[test]
    fn idle_game_resolves() {
        assert_eq!(resolve_when_idle(|| false, || Ok(7)).unwrap(), 7);
        assert!(resolve_when_idle(|| false, || -> Result<()> { Err(BoxError::NoLauncherFound.into()) }).is_err());
    }

    #[test]
    fn parses_quick_flag_without_command() {
        let cli = Cli::try_parse_from(["snowbox", "-q"]).unwrap();
        assert!(cli.quick);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_channel_and_toggles() {
        let cli = Cli::try_parse_from(["snowbox", "launch", "--channel", "bilibili"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Launch { channel: Some(LoginChannel::Bilibili) })));

        let cli = Cli::try_parse_from(["snowbox", "splash", "off", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Splash { state: Toggle::Off })));

        assert!(Cli::try_parse_from(["snowbox", "channel", "steam"]).is_err());
    }
}

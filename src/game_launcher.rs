use crate::error::{BoxError, Result};
use crate::launcher::{layout, LoginChannel};
use crate::planner::{self, LaunchPlan, LaunchTarget, PathRenderer};
use crate::preferences::GamePreferences;
use crate::resolver::ResolvedEnvironment;
use crate::update::RemoteVersionProbe;
use chrono::{DateTime, Utc};
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use tracing::{debug, info};

/// How long a started game gets to show up in the process list.
const STARTUP_GRACE: Duration = Duration::from_secs(90);

/// Starts a planned process and reports its pid.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessStarter {
    fn start(&self, plan: &LaunchPlan) -> Result<u32>;
}

/// Wine binary and prefix used to run the Windows executables.
#[derive(Debug, Clone)]
pub struct WineRunner {
    pub runner: PathBuf,
    pub prefix: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SystemStarter {
    pub wine: Option<WineRunner>,
}

impl SystemStarter {
    pub fn native() -> Self {
        Self { wine: None }
    }

    pub fn wine(runner: PathBuf, prefix: PathBuf) -> Self {
        Self {
            wine: Some(WineRunner { runner, prefix }),
        }
    }

    #[cfg(windows)]
    fn command(&self, plan: &LaunchPlan) -> io::Result<Command> {
        use std::os::windows::process::CommandExt;

        // The user dir quoting must reach the game untouched
        let mut cmd = Command::new(&plan.executable);
        if !plan.arguments.is_empty() {
            cmd.raw_arg(&plan.arguments);
        }
        Ok(cmd)
    }

    #[cfg(not(windows))]
    fn command(&self, plan: &LaunchPlan) -> io::Result<Command> {
        let wine = self
            .wine
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no Wine runner configured"))?;

        let mut cmd = Command::new(&wine.runner);
        cmd.env("WINEPREFIX", &wine.prefix)
            .arg(&plan.executable)
            .args(split_command_line(&plan.arguments));
        Ok(cmd)
    }
}

impl ProcessStarter for SystemStarter {
    fn start(&self, plan: &LaunchPlan) -> Result<u32> {
        let launch_failed = |source: io::Error| BoxError::LaunchFailed {
            path: plan.executable.clone(),
            source,
        };

        if !plan.executable.is_file() {
            return Err(launch_failed(io::Error::new(
                io::ErrorKind::NotFound,
                "executable does not exist",
            )));
        }

        let mut cmd = self.command(plan).map_err(launch_failed)?;
        cmd.current_dir(&plan.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!("Starting {:?}", cmd);
        let child = cmd.spawn().map_err(launch_failed)?;
        Ok(child.id())
    }
}

/// Splits a command line the way the Windows C runtime does, so Wine hands the
/// game the same argv it would get from `CreateProcess`.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut backslashes = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    backslashes += 1;
                }
                in_arg = true;
                if chars.peek() == Some(&'"') {
                    current.extend(std::iter::repeat_n('\\', backslashes / 2));
                    if backslashes % 2 == 1 {
                        chars.next();
                        current.push('"');
                    }
                } else {
                    current.extend(std::iter::repeat_n('\\', backslashes));
                }
            }
            '"' => {
                in_arg = true;
                if quoted && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    quoted = !quoted;
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                in_arg = true;
                current.push(c);
            }
        }
    }

    if in_arg {
        args.push(current);
    }
    args
}

/// Where `game.exe` sits below the game root, lowercased with `/` separators.
const GAME_EXE_TAIL: &str = "game/binaries/win64/game.exe";

/// Whether the game's `game.exe` is alive. Other programs that happen to be
/// called `game.exe` do not count.
pub fn is_game_running() -> bool {
    let system = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    system
        .processes()
        .values()
        .any(|process| is_game_process(process.name(), process.exe(), process.cmd()))
}

/// Under Wine the executable is the loader and the Windows path of the game
/// only shows up as the first command line argument.
fn is_game_process(name: &OsStr, exe: Option<&Path>, cmd: &[OsString]) -> bool {
    if !name.eq_ignore_ascii_case(layout::GAME_EXE) {
        return false;
    }
    exe.map(Path::as_os_str)
        .into_iter()
        .chain(cmd.first().map(OsString::as_os_str))
        .any(|path| {
            path.to_string_lossy()
                .replace('\\', "/")
                .to_ascii_lowercase()
                .ends_with(GAME_EXE_TAIL)
        })
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// The environment as it looked when the launch was decided.
    pub env: ResolvedEnvironment,
    pub plan: LaunchPlan,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Starts the game, or the official launcher when an update is pending.
///
/// Waits for the remote version probe first; everything else was settled by
/// the resolution.
pub async fn launch(
    env: &ResolvedEnvironment,
    probe: &mut RemoteVersionProbe,
    channel: LoginChannel,
    paths: &dyn PathRenderer,
    starter: &dyn ProcessStarter,
) -> Result<LaunchOutcome> {
    let update_available = match probe.poll() {
        Some(update) => update,
        None => {
            debug!("Waiting for the update check to finish");
            probe.wait().await
        }
    };
    let env = env.with_update_available(update_available);
    let plan = planner::plan(&env, channel, paths);

    if let Some(channel_save_dir) = &plan.channel_save_dir {
        GamePreferences::new(&env).propagate_to(channel_save_dir)?;
    }

    let pid = starter.start(&plan)?;
    match plan.target {
        LaunchTarget::Game => info!("Started game (pid {}) with {}", pid, plan.arguments),
        LaunchTarget::Launcher => info!("Update available, started the official launcher (pid {})", pid),
    }

    Ok(LaunchOutcome {
        env,
        plan,
        pid,
        started_at: Utc::now(),
    })
}

/// Blocks until the game has come and gone, returning how long it ran.
/// `None` when the game never showed up.
pub async fn wait_for_game_exit(poll: Duration) -> Option<chrono::Duration> {
    let started = Utc::now();
    let mut seen_at: Option<DateTime<Utc>> = None;

    loop {
        tokio::time::sleep(poll).await;
        let running = is_game_running();

        match (running, seen_at) {
            (true, None) => seen_at = Some(Utc::now()),
            (false, Some(seen)) => return Some(Utc::now() - seen),
            (false, None) if (Utc::now() - started).to_std().unwrap_or_default() > STARTUP_GRACE => {
                return None;
            }
            _ => {}
        }
    }
}

//! Running Blender as a child process
//!
//! The first interrupt asks Blender to stop (SIGTERM on Unix); a second one
//! while it is still shutting down kills it outright.

use crate::config::EnvFileError;
use crate::runtime::compiler::{LaunchPlan, ProcessEnvironment};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Lifecycle of the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    NotStarted,
    Running,
    /// Graceful stop requested
    Terminating,
    /// Exit code, `None` when terminated by a signal
    Exited(Option<i32>),
}

impl HostState {
    pub fn is_running(&self) -> bool {
        matches!(self, HostState::Running | HostState::Terminating)
    }
}

/// One launch of a compiled plan
pub struct HostProcess {
    plan: LaunchPlan,
    state: HostState,
    pid: Option<u32>,
    interrupted: bool,
}

impl HostProcess {
    pub fn new(plan: LaunchPlan) -> Self {
        Self {
            plan,
            state: HostState::NotStarted,
            pid: None,
            interrupted: false,
        }
    }

    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// Whether an interrupt was acted on during the last run
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Resolve the plan's environment against the current process and run it
    ///
    /// Variables not touched by the env file are inherited as-is, so names
    /// and values need not be valid UTF-8.
    pub async fn launch(
        &mut self,
        interrupts: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<Option<i32>, ProcessError> {
        let ambient_names = std::env::vars_os().map(|(name, _)| name);
        let env = self.plan.env.load(ambient_names)?;
        self.run(env, interrupts).await
    }

    /// Spawn the process with `env` and wait for it to exit
    ///
    /// Stdio is inherited. Each message on `interrupts` advances the
    /// shutdown sequence.
    pub async fn run(
        &mut self,
        env: ProcessEnvironment,
        interrupts: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<Option<i32>, ProcessError> {
        let program = self.plan.program().to_string();
        log::info!("Starting: {}", self.plan.args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&self.plan.args[1..]).kill_on_drop(true);
        if env.clear {
            cmd.env_clear();
        }
        cmd.envs(&env.vars);

        let mut child = cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: program.clone(),
            source: e,
        })?;
        self.pid = child.id();
        self.state = HostState::Running;
        log::debug!("Blender started with PID {:?}", self.pid);

        let mut interrupts_open = true;
        loop {
            tokio::select! {
                status = child.wait() => {
                    let code = status.map_err(ProcessError::Wait)?.code();
                    self.finish(code);
                    return Ok(code);
                }

                received = interrupts.recv(), if interrupts_open => {
                    if received.is_none() {
                        interrupts_open = false;
                        continue;
                    }

                    self.interrupted = true;
                    match self.state {
                        HostState::Running => {
                            log::info!("Interrupt received, asking Blender to exit (interrupt again to force)");
                            self.state = HostState::Terminating;
                            self.request_stop(&mut child);
                        }
                        HostState::Terminating => {
                            log::warn!("Second interrupt, killing Blender");
                            if let Err(e) = child.start_kill() {
                                log::error!("Failed to kill process: {}", e);
                            }
                            let code = child.wait().await.map_err(ProcessError::Wait)?.code();
                            self.finish(code);
                            return Ok(code);
                        }
                        HostState::NotStarted | HostState::Exited(_) => {}
                    }
                }
            }
        }
    }

    fn request_stop(&self, child: &mut tokio::process::Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = child;
            if let Some(pid) = self.pid {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    log::error!("Failed to send SIGTERM to {}: {}", pid, e);
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful signal available, stop immediately
            if let Err(e) = child.start_kill() {
                log::error!("Failed to stop process: {}", e);
            }
        }
    }

    fn finish(&mut self, code: Option<i32>) {
        self.state = HostState::Exited(code);
        self.pid = None;
        log::info!("Blender exited with code: {:?}", code);
    }
}

/// Errors that can occur while running the host process
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),
}

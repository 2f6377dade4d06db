//! 内置探针处理器实现
//!
//! 提供探针处理器trait以及内置的慢速、异常、镜像拉取和仓库克隆探针

use crate::error::ProbeError;
use crate::probe::scratch::ScratchSpace;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// 慢速探针的默认执行时长
pub const DEFAULT_SLOW_DELAY: Duration = Duration::from_secs(20);

/// 异常探针的默认错误信息
pub const DEFAULT_FAILURE_MESSAGE: &str = "Just to test we handle exceptions";

/// 探针处理器trait，定义探针执行接口
///
/// 处理器必须是非阻塞的：阻塞操作需通过 tokio 的异步接口或
/// `spawn_blocking` 完成，否则会拖慢同一运行时上的其他探针。
#[async_trait]
pub trait ProbeHandler: Send + Sync {
    /// 执行一次探测
    ///
    /// # 参数
    /// * `argument` - 配置中的探针参数
    ///
    /// # 返回
    /// * `Result<(), ProbeError>` - 成功或失败详情
    async fn run(&self, argument: &str) -> Result<(), ProbeError>;

    /// 启动时的一次性准备工作
    async fn prepare(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// 运行外部命令并捕获输出
///
/// unix 下子进程运行在独立的进程组中。执行被放弃时整个进程组被终止，
/// 命令派生的孙进程（例如 git 的 remote helper）不会残留。
///
/// # 返回
/// * `Result<String, ProbeError>` - 成功时返回标准输出
pub async fn run_command(program: &str, args: &[&str]) -> Result<String, ProbeError> {
    debug!("执行命令: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|source| ProbeError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let mut group = ProcessGroupGuard::new(child.id());
    let output = child
        .wait_with_output()
        .await
        .map_err(|source| ProbeError::Spawn {
            program: program.to_string(),
            source,
        })?;
    group.disarm();

    if !output.status.success() {
        return Err(ProbeError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// 命令未正常结束时终止其进程组
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        kill_process_group(pgid);
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!("已终止进程组 {}", pgid),
        // 进程组已经全部退出
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!("终止进程组 {} 失败: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// 慢速探针，用于验证超时处理
#[derive(Debug, Clone)]
pub struct SlowProbe {
    delay: Duration,
}

impl SlowProbe {
    /// 创建慢速探针
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SlowProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_DELAY)
    }
}

#[async_trait]
impl ProbeHandler for SlowProbe {
    async fn run(&self, _argument: &str) -> Result<(), ProbeError> {
        debug!("慢速探针开始执行");
        tokio::time::sleep(self.delay).await;
        debug!("慢速探针未被超时中断");
        Ok(())
    }
}

/// 异常探针，用于验证失败处理
#[derive(Debug, Clone)]
pub struct FailingProbe {
    message: String,
}

impl FailingProbe {
    /// 创建异常探针
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_MESSAGE)
    }
}

#[async_trait]
impl ProbeHandler for FailingProbe {
    async fn run(&self, _argument: &str) -> Result<(), ProbeError> {
        debug!("异常探针开始执行");
        Err(ProbeError::Failed(self.message.clone()))
    }
}

/// 镜像拉取探针，使用 skopeo 将镜像复制到临时目录
#[derive(Debug, Clone)]
pub struct ImagePullProbe {
    scratch: ScratchSpace,
    program: String,
}

impl ImagePullProbe {
    /// 创建镜像拉取探针
    pub fn new(scratch: ScratchSpace) -> Self {
        Self {
            scratch,
            program: "skopeo".to_string(),
        }
    }

    /// 替换镜像复制工具
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl ProbeHandler for ImagePullProbe {
    async fn run(&self, image: &str) -> Result<(), ProbeError> {
        if image.trim().is_empty() {
            return Err(ProbeError::Failed("未配置镜像地址".to_string()));
        }

        let dir = self.scratch.attempt().await?;
        debug!("拉取镜像 {} 到 {}", image, dir.path().display());

        let source = format!("docker://{image}");
        let destination = format!("dir://{}", path_arg(dir.path()));
        let result = run_command(&self.program, &["copy", &source, &destination]).await;
        dir.release().await;

        let stdout = result?;
        debug!("镜像拉取完成: {}", stdout.trim());
        Ok(())
    }

    async fn prepare(&self) -> Result<(), ProbeError> {
        self.scratch.purge().await.map_err(ProbeError::Scratch)
    }
}

/// 仓库克隆探针，使用 git 将仓库克隆到临时目录
#[derive(Debug, Clone)]
pub struct RepoCloneProbe {
    scratch: ScratchSpace,
    program: String,
}

impl RepoCloneProbe {
    /// 创建仓库克隆探针
    pub fn new(scratch: ScratchSpace) -> Self {
        Self {
            scratch,
            program: "git".to_string(),
        }
    }

    /// 替换版本控制客户端
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl ProbeHandler for RepoCloneProbe {
    async fn run(&self, repo: &str) -> Result<(), ProbeError> {
        if repo.trim().is_empty() {
            return Err(ProbeError::Failed("未配置仓库地址".to_string()));
        }

        let dir = self.scratch.attempt().await?;
        // git clone 要求目标目录不存在或为空
        let target = dir.path().join("repo");
        debug!("克隆仓库 {} 到 {}", repo, target.display());

        let result = run_command(&self.program, &["clone", repo, &path_arg(&target)]).await;
        dir.release().await;

        let stdout = result?;
        debug!("仓库克隆完成: {}", stdout.trim());
        Ok(())
    }

    async fn prepare(&self) -> Result<(), ProbeError> {
        self.scratch.purge().await.map_err(ProbeError::Scratch)
    }
}

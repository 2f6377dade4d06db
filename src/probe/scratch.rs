//! 探针临时目录管理
//!
//! 每个有副作用的探针拥有独立的根目录 `<scratch_dir>/<probe_name>`，
//! 每次执行都在根目录下创建全新的尝试目录。被放弃的执行最多只能写入
//! 自己的尝试目录，不会影响后续周期。

use crate::error::ProbeError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// 单个探针的临时目录空间
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    /// 创建临时目录空间
    ///
    /// # 参数
    /// * `base` - 所有探针共享的临时目录根路径
    /// * `probe_name` - 探针名称
    pub fn new(base: impl AsRef<Path>, probe_name: &str) -> Self {
        Self {
            root: base.as_ref().join(probe_name),
        }
    }

    /// 探针根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 删除整个根目录，目录不存在不视为错误
    pub async fn purge(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                debug!("已清理探针临时目录: {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 尽力清理上次遗留的尝试目录，忽略所有错误
    async fn clean_stale(&self) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                debug!("清理遗留目录失败 {}: {}", path.display(), e);
            }
        }
    }

    /// 为一次执行准备全新的尝试目录
    ///
    /// 返回的 [`AttemptDir`] 在释放或被丢弃时删除目录，执行被放弃时同样会被清理。
    pub async fn attempt(&self) -> Result<AttemptDir, ProbeError> {
        self.clean_stale().await;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(ProbeError::Scratch)?;

        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("attempt-")
                .tempdir_in(root)
        })
        .await
        .map_err(|e| ProbeError::Scratch(io::Error::other(e)))?
        .map_err(ProbeError::Scratch)?;

        Ok(AttemptDir { dir: Some(dir) })
    }
}

/// 单次执行的尝试目录
///
/// 目录删除总是在阻塞线程池中进行。超时后处理器的 future 在运行时线程上被丢弃，
/// 大目录的删除不能占用该线程。
#[derive(Debug)]
pub struct AttemptDir {
    dir: Option<TempDir>,
}

impl AttemptDir {
    /// 尝试目录路径
    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// 执行结束后删除尝试目录，并等待删除完成
    pub async fn release(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let path = dir.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || dir.close()).await;
        if let Ok(Err(e)) = result {
            debug!("删除尝试目录失败 {}: {}", path.display(), e);
        }
    }
}

impl Drop for AttemptDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    let path = dir.path().to_path_buf();
                    if let Err(e) = dir.close() {
                        debug!("删除尝试目录失败 {}: {}", path.display(), e);
                    }
                });
            }
            // 不在运行时内时直接同步删除
            Err(_) => drop(dir),
        }
    }
}

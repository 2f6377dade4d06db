//! 探针注册表
//!
//! 维护探针名称到处理器的显式映射，并把配置中的探针解析为可执行的探针集合

use crate::config::ProbeConfig;
use crate::error::{ConfigError, ProbeExporterError, RegistryError};
use crate::probe::handlers::{FailingProbe, ImagePullProbe, ProbeHandler, RepoCloneProbe, SlowProbe};
use crate::probe::result::ProbeSpec;
use crate::probe::scratch::ScratchSpace;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 慢速探针名称
pub const PROBE_SLOW: &str = "probe_slow";
/// 异常探针名称
pub const PROBE_EXCEPTION: &str = "probe_exception";
/// 镜像拉取探针名称
pub const PROBE_QUAY: &str = "probe_quay";
/// 仓库克隆探针名称
pub const PROBE_GITHUB: &str = "probe_github";

/// 已解析的探针：声明加上对应的处理器
#[derive(Clone)]
pub struct ActiveProbe {
    /// 探针声明
    pub spec: ProbeSpec,
    /// 探针处理器
    pub handler: Arc<dyn ProbeHandler>,
}

impl ActiveProbe {
    /// 创建已解析的探针
    pub fn new(spec: ProbeSpec, handler: Arc<dyn ProbeHandler>) -> Self {
        Self { spec, handler }
    }
}

impl std::fmt::Debug for ActiveProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveProbe")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// 配置解析结果
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// 可执行的探针
    pub active: Vec<ActiveProbe>,
    /// 因名称无法解析而被排除的配置段
    pub excluded: Vec<String>,
}

impl Resolution {
    /// 可执行探针的名称列表
    pub fn active_names(&self) -> Vec<&str> {
        self.active.iter().map(|p| p.spec.name.as_str()).collect()
    }
}

/// 探针注册表
#[derive(Default)]
pub struct ProbeRegistry {
    handlers: BTreeMap<String, Arc<dyn ProbeHandler>>,
}

impl ProbeRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含全部内置探针的注册表
    ///
    /// # 参数
    /// * `scratch_base` - 有副作用的探针使用的临时目录根路径
    pub fn with_builtin_probes(scratch_base: impl AsRef<Path>) -> Self {
        let base = scratch_base.as_ref();
        let mut registry = Self::new();

        registry
            .handlers
            .insert(PROBE_SLOW.to_string(), Arc::new(SlowProbe::default()));
        registry
            .handlers
            .insert(PROBE_EXCEPTION.to_string(), Arc::new(FailingProbe::default()));
        registry.handlers.insert(
            PROBE_QUAY.to_string(),
            Arc::new(ImagePullProbe::new(ScratchSpace::new(base, PROBE_QUAY))),
        );
        registry.handlers.insert(
            PROBE_GITHUB.to_string(),
            Arc::new(RepoCloneProbe::new(ScratchSpace::new(base, PROBE_GITHUB))),
        );

        registry
    }

    /// 注册新的探针
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ProbeHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateHandler { name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// 按名称查找处理器
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProbeHandler>, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProbe {
                name: name.to_string(),
            })
    }

    /// 是否注册了指定名称
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// 所有已注册的探针名称
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// 把配置中的探针解析为可执行集合，未知名称记录警告后排除
    ///
    /// 只有已注册探针的配置段会被解析，其中的无效配置是致命错误；
    /// 未知探针的配置段不做任何校验。
    pub fn resolve(&self, probes: &[ProbeConfig]) -> Result<Resolution, ConfigError> {
        let mut resolution = Resolution::default();

        for probe in probes {
            match self.get(&probe.name) {
                Ok(handler) => resolution
                    .active
                    .push(ActiveProbe::new(ProbeSpec::try_from(probe)?, handler)),
                Err(e) => {
                    warn!("加载探针失败，已跳过配置段 '{}': {}", probe.name, e);
                    resolution.excluded.push(probe.name.clone());
                }
            }
        }

        info!(
            "已加载 {} 个探针: {}",
            resolution.active.len(),
            resolution.active_names().join(", ")
        );

        Ok(resolution)
    }

    /// 解析探针，没有任何可执行探针时返回错误
    pub fn resolve_required(
        &self,
        probes: &[ProbeConfig],
    ) -> Result<Resolution, ProbeExporterError> {
        let resolution = self.resolve(probes)?;
        if resolution.active.is_empty() {
            return Err(RegistryError::NoActiveProbes {
                configured: probes.len(),
            }
            .into());
        }
        Ok(resolution)
    }
}

/// 执行各探针的启动准备工作，失败只记录警告
pub async fn prepare_probes(probes: &[ActiveProbe]) {
    for probe in probes {
        if let Err(e) = probe.handler.prepare().await {
            warn!("探针 {} 准备失败: {}", probe.spec.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_config(name: &str) -> ProbeConfig {
        ProbeConfig::new(name, toml::from_str("timeout = 5").unwrap())
    }

    #[test]
    fn test_builtin_probes_registered() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        assert_eq!(
            registry.names(),
            vec![PROBE_EXCEPTION, PROBE_GITHUB, PROBE_QUAY, PROBE_SLOW]
        );
    }

    #[test]
    fn test_unknown_probe_lookup() {
        let registry = ProbeRegistry::new();
        let err = registry.get("probe_missing").err().unwrap();
        assert_eq!(
            err,
            RegistryError::UnknownProbe {
                name: "probe_missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ProbeRegistry::new();
        registry
            .register("probe_custom", Arc::new(SlowProbe::default()))
            .unwrap();
        let err = registry
            .register("probe_custom", Arc::new(FailingProbe::default()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler { .. }));
    }

    #[test]
    fn test_resolve_excludes_unknown_names() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        let probes = vec![
            probe_config("probe_exception"),
            probe_config("probe_typo"),
            probe_config("probe_slow"),
        ];

        let resolution = registry.resolve(&probes).unwrap();
        assert_eq!(resolution.active_names(), vec!["probe_exception", "probe_slow"]);
        assert_eq!(resolution.excluded, vec!["probe_typo".to_string()]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        let probes = vec![probe_config("probe_slow"), probe_config("probe_other")];

        let first = registry.resolve(&probes).unwrap();
        let second = registry.resolve(&probes).unwrap();
        assert_eq!(first.active_names(), second.active_names());
        assert_eq!(first.excluded, second.excluded);
    }

    #[test]
    fn test_resolve_required_all_unknown() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        let probes = vec![probe_config("probe_a"), probe_config("probe_b")];

        let err = registry.resolve_required(&probes).unwrap_err();
        assert!(matches!(
            err,
            ProbeExporterError::Registry(RegistryError::NoActiveProbes { configured: 2 })
        ));
    }

    #[test]
    fn test_unknown_section_is_not_parsed() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        let probes = vec![
            probe_config("probe_slow"),
            ProbeConfig::new("probe_retired", toml::from_str(r#"args = "x""#).unwrap()),
            ProbeConfig::new("probe_paused", toml::from_str("timeout = 0").unwrap()),
        ];

        let resolution = registry.resolve_required(&probes).unwrap();
        assert_eq!(resolution.active_names(), vec!["probe_slow"]);
        assert_eq!(
            resolution.excluded,
            vec!["probe_retired".to_string(), "probe_paused".to_string()]
        );
    }

    #[test]
    fn test_known_section_without_timeout_is_fatal() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        let probes = vec![ProbeConfig::new(
            "probe_slow",
            toml::from_str(r#"args = "x""#).unwrap(),
        )];

        let err = registry.resolve(&probes).unwrap_err();
        assert!(err.to_string().contains("probe_slow"));
    }

    #[test]
    fn test_resolve_required_empty_config() {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        assert!(registry.resolve_required(&[]).is_err());
    }
}

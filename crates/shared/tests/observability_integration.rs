//! 可观测性模块集成测试
//!
//! 测试 metrics 记录函数与配置的核心行为。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use pals_shared::observability::metrics::{
        record_lock_abandoned, record_lock_acquire, record_lock_release, record_session_wait,
    };

    /// 在局部 recorder 下执行 `f` 并返回渲染结果
    fn render_with(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_acquire_outcomes_are_labelled() {
        let rendered = render_with(|| {
            record_lock_acquire("billing", "exclusive", "acquired", 0.002);
            record_lock_acquire("billing", "shared", "rejected", 0.0);
            record_lock_acquire("billing", "exclusive", "timeout", 30.0);
        });

        assert!(rendered.contains("pals_lock_acquire_total"));
        assert!(rendered.contains("pals_lock_acquire_wait_seconds"));
        assert!(rendered.contains("namespace=\"billing\""));
        assert!(rendered.contains("mode=\"shared\""));
        assert!(rendered.contains("outcome=\"rejected\""));
        assert!(rendered.contains("outcome=\"timeout\""));
    }

    #[test]
    fn test_release_and_abandon_are_recorded() {
        let rendered = render_with(|| {
            record_lock_release("billing", "exclusive", "not_held");
            record_lock_abandoned("billing");
            record_session_wait(0.5);
        });

        assert!(rendered.contains("pals_lock_release_total"));
        assert!(rendered.contains("outcome=\"not_held\""));
        assert!(rendered.contains("pals_lock_abandoned_total"));
        assert!(rendered.contains("pals_session_wait_seconds"));
    }

    #[test]
    fn test_nothing_rendered_without_records() {
        let rendered = render_with(|| {});
        assert!(!rendered.contains("pals_lock_acquire_total"));
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use pals_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.metrics_enabled);
        assert!(!config.json_logs());
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            log_format: "JSON".to_string(),
            metrics_enabled: true,
            metrics_port: 9091,
        };

        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs());
    }
}

// ============================================================================
// Guard 测试
// ============================================================================

mod guard_tests {
    use pals_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard() {
        // 创建空 guard 不应 panic
        let guard = ObservabilityGuard::empty();
        assert!(guard.metrics_addr().is_none());
        drop(guard);
    }

    #[test]
    fn test_guard_drop() {
        for _ in 0..10 {
            let guard = ObservabilityGuard::empty();
            drop(guard);
        }
    }
}

// Registration pass - turns managed components into scheduled tasks
//
// Runs once at startup. Components are visited in name order so task
// registration is identical across restarts; any bad schedule aborts startup.

use crate::application::scheduler::{ScheduledTask, TaskScheduler, TaskSpec};
use crate::domain::ScheduleExpr;
use crate::error::{AppError, Result};
use crate::port::{ConfigSource, ManagedComponent, ScheduleSource};
use std::sync::Arc;
use tracing::info;

/// Config prefix of per-task schedule overrides (`schedules.<task id>`)
pub const SCHEDULE_OVERRIDE_PREFIX: &str = "schedules";

/// Register every scheduled method of `components`
///
/// Task ids are `"{component}.{method}"`. A `schedules.<task id>` entry in
/// `config` replaces whatever the method declares.
pub fn register_components(
    scheduler: &TaskScheduler,
    config: &dyn ConfigSource,
    mut components: Vec<Arc<dyn ManagedComponent>>,
) -> Result<Vec<Arc<ScheduledTask>>> {
    components.sort_by(|a, b| a.name().cmp(b.name()));

    let mut registered = Vec::new();
    for component in &components {
        for method in component.scheduled_methods() {
            let task_id = format!("{}.{}", component.name(), method.method);
            let expr = resolve_schedule(config, &task_id, &method.schedule)?;
            let schedule = ScheduleExpr::parse(&expr)
                .map_err(|e| AppError::Config(format!("Task '{}': {}", task_id, e)))?;

            let spec = TaskSpec::new(task_id, schedule, method.callback)
                .exclusivity(method.exclusivity)
                .report_overrun(method.report_overrun);
            registered.push(scheduler.register(spec)?);
        }
    }

    info!(
        components = components.len(),
        tasks = registered.len(),
        "Component registration complete"
    );
    Ok(registered)
}

fn resolve_schedule(config: &dyn ConfigSource, task_id: &str, source: &ScheduleSource) -> Result<String> {
    let override_key = format!("{}.{}", SCHEDULE_OVERRIDE_PREFIX, task_id);
    if let Some(expr) = config.get_string(&override_key) {
        info!(task_id = %task_id, schedule = %expr, "Schedule overridden by configuration");
        return Ok(expr);
    }

    match source {
        ScheduleSource::Literal(expr) => Ok(expr.clone()),
        ScheduleSource::ConfigKey(key) => config.get_string(key).ok_or_else(|| {
            AppError::Config(format!(
                "Task '{}': configuration key '{}' is not set",
                task_id, key
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scheduler::{SchedulerConfig, SchedulerDeps};
    use crate::domain::Exclusivity;
    use crate::port::alert_sink::mocks::RecordingAlertSink;
    use crate::port::callback::task_fn;
    use crate::port::config_source::mocks::StaticConfigSource;
    use crate::port::lock_store::mocks::InMemoryLockStore;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::{InstanceIdentity, ScheduledMethod};

    struct Component {
        name: &'static str,
        methods: Vec<(&'static str, ScheduleSource, bool)>,
    }

    impl ManagedComponent for Component {
        fn name(&self) -> &str {
            self.name
        }

        fn scheduled_methods(&self) -> Vec<ScheduledMethod> {
            self.methods
                .iter()
                .map(|(method, schedule, exclusive)| {
                    let m = ScheduledMethod::new(*method, schedule.clone(), task_fn(|| async { Ok(()) }));
                    if *exclusive {
                        m.cluster_exclusive()
                    } else {
                        m
                    }
                })
                .collect()
        }
    }

    fn scheduler() -> TaskScheduler {
        let clock = Arc::new(ManualTimeProvider::new(0));
        TaskScheduler::new(
            SchedulerDeps {
                time_provider: clock.clone(),
                lock_store: Arc::new(InMemoryLockStore::new(clock)),
                alert_sink: Arc::new(RecordingAlertSink::new()),
                identity: InstanceIdentity::new("node-a", "127.0.0.1:9527"),
            },
            SchedulerConfig::default(),
        )
    }

    fn literal(expr: &str) -> ScheduleSource {
        ScheduleSource::Literal(expr.to_string())
    }

    #[test]
    fn test_components_registered_in_name_order() {
        let scheduler = scheduler();
        let components: Vec<Arc<dyn ManagedComponent>> = vec![
            Arc::new(Component {
                name: "reports",
                methods: vec![("rollup", literal("0 0 * * * *"), true)],
            }),
            Arc::new(Component {
                name: "billing",
                methods: vec![
                    ("sweep", literal("0 */5 * * * *"), false),
                    ("close", literal("@every 30s"), false),
                ],
            }),
        ];

        let tasks = register_components(&scheduler, &StaticConfigSource::new(), components).unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["billing.sweep", "billing.close", "reports.rollup"]);
        assert_eq!(
            scheduler.task("reports.rollup").unwrap().exclusivity(),
            Exclusivity::ClusterExclusive
        );
    }

    #[test]
    fn test_config_key_is_resolved() {
        let scheduler = scheduler();
        let config = StaticConfigSource::new().with("jobs.cleanup", "0 30 2 * * *");
        let components: Vec<Arc<dyn ManagedComponent>> = vec![Arc::new(Component {
            name: "store",
            methods: vec![("cleanup", ScheduleSource::ConfigKey("jobs.cleanup".to_string()), false)],
        })];

        register_components(&scheduler, &config, components).unwrap();
        assert_eq!(scheduler.task("store.cleanup").unwrap().schedule().as_str(), "0 30 2 * * *");
    }

    #[test]
    fn test_override_wins_over_literal() {
        let scheduler = scheduler();
        let config = StaticConfigSource::new().with("schedules.store.cleanup", "0 0 4 * * *");
        let components: Vec<Arc<dyn ManagedComponent>> = vec![Arc::new(Component {
            name: "store",
            methods: vec![("cleanup", literal("0 30 2 * * *"), false)],
        })];

        register_components(&scheduler, &config, components).unwrap();
        assert_eq!(scheduler.task("store.cleanup").unwrap().schedule().as_str(), "0 0 4 * * *");
    }

    #[test]
    fn test_missing_config_key_names_the_task() {
        let scheduler = scheduler();
        let components: Vec<Arc<dyn ManagedComponent>> = vec![Arc::new(Component {
            name: "store",
            methods: vec![("cleanup", ScheduleSource::ConfigKey("jobs.cleanup".to_string()), false)],
        })];

        let err = register_components(&scheduler, &StaticConfigSource::new(), components).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("store.cleanup"));
        assert!(err.to_string().contains("jobs.cleanup"));
    }

    #[test]
    fn test_invalid_expression_names_the_task() {
        let scheduler = scheduler();
        let components: Vec<Arc<dyn ManagedComponent>> = vec![Arc::new(Component {
            name: "store",
            methods: vec![("cleanup", literal("every tuesday"), false)],
        })];

        let err = register_components(&scheduler, &StaticConfigSource::new(), components).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("store.cleanup"));
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let scheduler = scheduler();
        let components: Vec<Arc<dyn ManagedComponent>> = vec![Arc::new(Component {
            name: "store",
            methods: vec![
                ("cleanup", literal("0 * * * * *"), false),
                ("cleanup", literal("30 * * * * *"), false),
            ],
        })];

        let err = register_components(&scheduler, &StaticConfigSource::new(), components).unwrap_err();
        assert!(err.to_string().contains("store.cleanup"));
    }
}

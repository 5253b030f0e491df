use app2kube_core::{Application, CronJobSpec};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec as K8sCronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{pod_spec, process_named};
use crate::container::process_container;
use crate::error::{EngineError, Result};

const DEFAULT_HISTORY_LIMIT: i32 = 2;
const DEFAULT_BACKOFF_LIMIT: i32 = 6;
const DEFAULT_ACTIVE_DEADLINE_SECONDS: i64 = 86_400;
const DEFAULT_RESTART_POLICY: &str = "Never";

/// One CronJob per `cronjob` entry, in name order
pub fn build_cron_jobs(app: &Application) -> Result<Vec<CronJob>> {
    app.cronjob
        .iter()
        .map(|(name, job)| build_cron_job(app, name, job))
        .collect()
}

fn build_cron_job(app: &Application, cron_name: &str, job: &CronJobSpec) -> Result<CronJob> {
    if job.schedule.is_empty() {
        return Err(EngineError::config(format!(
            "schedule required for cron: {cron_name}"
        )));
    }

    let mut containers = Vec::new();
    if let Some(container) = &job.container
        && container.command.as_ref().is_some_and(|c| !c.is_empty())
    {
        let mut container = container.clone();
        process_container(&mut container, app)?;
        if container.name.is_empty() {
            container.name = format!("{cron_name}-job");
        }
        containers.push(container);
    }
    containers.extend(process_named(&job.containers, app)?);

    let mut pod = pod_spec(app, containers, Vec::new())?;
    pod.restart_policy = Some(
        job.restart_policy
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_RESTART_POLICY.to_string()),
    );

    Ok(CronJob {
        metadata: app.object_meta(format!(
            "{}-{}",
            app.release_name(),
            cron_name.to_lowercase()
        )),
        spec: Some(K8sCronJobSpec {
            concurrency_policy: job.concurrency_policy.clone().filter(|p| !p.is_empty()),
            failed_jobs_history_limit: Some(or_default(
                job.failed_jobs_history_limit,
                DEFAULT_HISTORY_LIMIT,
            )),
            schedule: job.schedule.clone(),
            successful_jobs_history_limit: Some(or_default(
                job.successful_jobs_history_limit,
                DEFAULT_HISTORY_LIMIT,
            )),
            suspend: Some(job.suspend || app.common.cronjob_suspend),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(JobSpec {
                    active_deadline_seconds: Some(or_default(
                        job.active_deadline_seconds,
                        DEFAULT_ACTIVE_DEADLINE_SECONDS,
                    )),
                    backoff_limit: Some(or_default(job.backoff_limit, DEFAULT_BACKOFF_LIMIT)),
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(pod),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn or_default<T: Default + PartialEq>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

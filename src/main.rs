use async_trait::async_trait;
use clap::Parser;
use jobcontext::application::engine::JobContextManager;
use jobcontext::application::policy::{CompletionPolicy, RequeuePolicy, TopicRoutingPolicy};
use jobcontext::config::{RuntimeConfig, Variant};
use jobcontext::domain::cancel::CancelSignal;
use jobcontext::domain::envelope::EnvelopeMapper;
use jobcontext::domain::message::JobContextMessage;
use jobcontext::domain::ports::{MessageProperties, StageHandler};
use jobcontext::infrastructure::in_memory::{
    IdentityMapper, InMemoryAuditor, InMemoryBus, InMemoryJobStatus,
};
use jobcontext::interfaces::json::job_reader::JobReader;
use jobcontext::interfaces::json::trail_writer::TrailWriter;
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Job definition JSON file
    input: PathBuf,

    /// Runtime configuration TOML file (optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deployment variant, overrides the configuration file
    #[arg(long, value_enum)]
    variant: Option<Variant>,

    /// Reject the job at this topic pointer
    #[arg(long)]
    reject_at: Option<usize>,
}

/// Records each stage it runs in the `CompletedStages` attribute.
struct PassThroughStage {
    reject_at: Option<usize>,
}

#[async_trait]
impl StageHandler<JobContextMessage> for PassThroughStage {
    async fn handle(
        &self,
        payload: &mut JobContextMessage,
        cancel: CancelSignal,
    ) -> jobcontext::error::Result<bool> {
        cancel.check()?;
        if self.reject_at == Some(payload.topic_pointer) {
            return Ok(false);
        }

        let stage = payload
            .current_topic()
            .map(|topic| topic.subscription_name.clone())
            .unwrap_or_default();
        let completed = payload
            .attributes
            .entry("CompletedStages".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(stages) = completed {
            stages.push(Value::String(stage));
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RuntimeConfig::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(variant) = cli.variant {
        config.variant = variant;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let job = JobReader::new(File::open(&cli.input).into_diagnostic()?)
        .read_job()
        .into_diagnostic()?;
    if job.topics.is_empty() {
        miette::bail!("job {} has no topics", job.job_id);
    }

    let bus = InMemoryBus::new(config.queue_name.clone());
    let auditor = Arc::new(InMemoryAuditor::new());
    let status = Arc::new(InMemoryJobStatus::new());

    let policy: Arc<dyn CompletionPolicy> = match config.variant {
        Variant::Topic => Arc::new(TopicRoutingPolicy::new(status.clone())),
        Variant::Queue => Arc::new(RequeuePolicy::new()),
    };
    let manager = Arc::new(JobContextManager::<JobContextMessage>::new(
        Arc::new(bus.clone()),
        auditor.clone(),
        Arc::new(IdentityMapper),
        Arc::new(PassThroughStage {
            reject_at: cli.reject_at,
        }),
        policy,
    ));

    let first_target = match config.variant {
        Variant::Topic => {
            let names: BTreeSet<_> = job
                .topics
                .iter()
                .map(|topic| topic.subscription_name.clone())
                .collect();
            for name in names {
                manager
                    .clone()
                    .subscribe_to(&bus.subscription(name))
                    .await
                    .into_diagnostic()?;
            }
            job.current_topic().map(|topic| topic.subscription_name.clone())
        }
        Variant::Queue => {
            manager
                .clone()
                .subscribe_to(&bus.subscription(bus.queue_name()))
                .await
                .into_diagnostic()?;
            None
        }
    };

    tracing::info!(job_id = %job.job_id, variant = ?config.variant, "Submitting job");
    let wire = EnvelopeMapper::new().encode(&job).into_diagnostic()?;
    bus.enqueue(wire, MessageProperties::new(), first_target.as_deref())
        .await;

    let results = bus
        .run_until_idle(CancelSignal::never())
        .await
        .into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = TrailWriter::new(stdout.lock());
    writer
        .write_audits(&auditor.records().await)
        .into_diagnostic()?;
    writer
        .write_status(&status.events().await)
        .into_diagnostic()?;
    writer.write_results(&results).into_diagnostic()?;

    Ok(())
}

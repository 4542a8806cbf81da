use crate::{
    args::{
        Args,
        Command,
        DeploymentArgs,
    },
    collector::NewRelicCollector,
    config::ExporterConfig,
    server,
};
use color_eyre::Result;
use comfy_table::{
    presets,
    Table,
};
use eyre::Context as _;
use newrelic_client::{
    Application,
    ApplicationSource as _,
    Deployment,
    NewRelicClient,
};
use prometheus::Registry;

pub struct App {
    config: ExporterConfig,
    command: Command,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = ExporterConfig::new(&args).wrap_err("invalid configuration")?;
        Ok(Self {
            config,
            command: args.command_or_default(),
        })
    }

    pub async fn run(self) -> Result<()> {
        match self.command.clone() {
            Command::Serve => self.serve().await,
            Command::Applications => self.list_applications().await,
            Command::RecordDeployment(deployment) => self.record_deployment(deployment).await,
        }
    }

    async fn serve(self) -> Result<()> {
        let application = self.config.application()?.to_string();
        let collector = NewRelicCollector::new(application.clone(), self.client().await?)?
            .with_metric_kind(self.config.metric_kind)
            .with_failure_policy(self.config.failure_policy);

        let registry = Registry::new();
        registry.register(Box::new(collector))?;

        info!(
            application = %application,
            api_url = %self.config.api_url,
            path = %self.config.metrics_path,
            metric_kind = self.config.metric_kind.as_ref(),
            failure_policy = self.config.failure_policy.as_ref(),
            "starting New Relic exporter"
        );

        let router = server::create_router(registry, &self.config.metrics_path);
        server::serve(self.config.listen, router).await
    }

    async fn list_applications(self) -> Result<()> {
        let client = self.client().await?;
        let applications = tokio::task::spawn_blocking(move || client.list_applications())
            .await?
            .wrap_err("cannot list New Relic applications")?;

        println!("{}", applications_table(&applications));
        Ok(())
    }

    async fn record_deployment(self, args: DeploymentArgs) -> Result<()> {
        let application = self.config.application()?.to_string();
        let client = self.client().await?;
        let deployment = Deployment {
            revision: args.revision,
            changelog: args.changelog,
            description: args.description,
            user: args.user,
        };

        let id = tokio::task::spawn_blocking(move || -> Result<i64> {
            let app = client.find_application_by_name(&application)?;
            client.record_deployment(app.id, &deployment)?;
            info!(application = %application, id = app.id, revision = %deployment.revision, "recorded deployment");
            Ok(app.id)
        })
        .await??;

        println!("Recorded deployment for application {id}");
        Ok(())
    }

    /// The blocking client spins up a runtime of its own, which must not
    /// happen on an async worker.
    async fn client(&self) -> Result<NewRelicClient> {
        let config = self.config.clone();
        let client = tokio::task::spawn_blocking(move || config.client()).await??;
        Ok(client)
    }
}

fn applications_table(applications: &[Application]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_header(vec!["ID", "Name", "Language", "Health"]);
    for app in applications {
        table.add_row(vec![
            app.id.to_string(),
            app.name.clone(),
            app.language.clone(),
            app.health_status.clone(),
        ]);
    }
    table
}

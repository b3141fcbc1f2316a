use super::ViewContext;
use crate::{
    backend_client::BackendApi,
    error::ViewError,
    session::Role,
    types::{ImageAnalysis, Report, ReportStatus, ReportUpdate},
};
use log::{debug, info};
use tokio::sync::OnceCell;

/// Review of the reports assigned to the signed-in supervisor
pub struct SupervisorDashboard<B> {
    ctx: ViewContext<B>,
    supervisor: OnceCell<String>,
}

impl<B: BackendApi> SupervisorDashboard<B> {
    pub fn new(ctx: ViewContext<B>) -> Result<Self, ViewError> {
        Ok(Self {
            ctx: ctx.require(Role::Supervisor)?,
            supervisor: OnceCell::new(),
        })
    }

    /// Name reports are assigned by, resolved once from the profile
    pub async fn supervisor(&self) -> Result<&str, ViewError> {
        let name = self
            .supervisor
            .get_or_try_init(|| async {
                let profile = self.ctx.call(self.ctx.api.me(&self.ctx.token)).await;
                profile.and_then(|profile| {
                    profile
                        .username
                        .or(profile.email)
                        .filter(|name| !name.is_empty())
                        .ok_or_else(|| {
                            ViewError::Validation(
                                "profile has neither username nor e-mail".to_string(),
                            )
                        })
                })
            })
            .await?;

        Ok(name.as_str())
    }

    pub async fn reports(&self) -> Result<Vec<Report>, ViewError> {
        debug!("reports() called");

        let supervisor = self.supervisor().await?.to_string();
        self.ctx
            .call(self.ctx.api.reports(&self.ctx.token, Some(supervisor)))
            .await
    }

    /// Approve or reject a report; blank recommendations are cleared
    pub async fn review(
        &self,
        id: &str,
        status: ReportStatus,
        recommendations: &str,
    ) -> Result<(), ViewError> {
        debug!("review() called for {id} with status {status}");

        let recommendations = recommendations.trim();
        let update = ReportUpdate {
            status: Some(status),
            recommendations: Some((!recommendations.is_empty()).then(|| recommendations.to_string())),
            ..Default::default()
        };

        self.ctx
            .call(self.ctx.api.update_report(&self.ctx.token, id, update))
            .await?;
        info!("report {id} {status}");
        Ok(())
    }

    /// Run crack detection on one report image and store the result on the report
    pub async fn analyze(&self, id: &str, image_path: &str) -> Result<ImageAnalysis, ViewError> {
        debug!("analyze() called for {id} with {image_path}");

        let image_url = self.ctx.api.resolve_url(image_path);
        let analysis = self
            .ctx
            .call(self.ctx.api.analyze_images(&self.ctx.token, vec![image_url]))
            .await?;

        let update = ReportUpdate {
            evaluation: Some(analysis.evaluation.clone()),
            has_crack: Some(analysis.has_crack),
            ..Default::default()
        };
        self.ctx
            .call(self.ctx.api.update_report(&self.ctx.token, id, update))
            .await?;

        info!(
            "analyzed report {id}: {} (crack: {})",
            analysis.evaluation, analysis.has_crack
        );
        Ok(analysis)
    }
}

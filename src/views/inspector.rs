use super::ViewContext;
use crate::{
    backend_client::BackendApi,
    error::ViewError,
    session::Role,
    types::{NewReport, Report, UserProfile},
};
use log::{debug, info};
use serde_valid::Validate;

pub struct InspectorDashboard<B> {
    ctx: ViewContext<B>,
}

impl<B: BackendApi> InspectorDashboard<B> {
    pub fn new(ctx: ViewContext<B>) -> Result<Self, ViewError> {
        Ok(Self {
            ctx: ctx.require(Role::Inspector)?,
        })
    }

    pub async fn profile(&self) -> Result<UserProfile, ViewError> {
        debug!("profile() called");

        self.ctx.call(self.ctx.api.me(&self.ctx.token)).await
    }

    pub async fn submit_report(&self, report: NewReport) -> Result<Report, ViewError> {
        debug!("submit_report() called for {}", report.location);

        report
            .validate()
            .map_err(|e| ViewError::Validation(e.to_string()))?;

        let created = self
            .ctx
            .call(self.ctx.api.create_report(&self.ctx.token, report))
            .await?;
        info!("submitted report {}", created.id);
        Ok(created)
    }

    /// Reports filed by this inspector
    pub async fn my_reports(&self) -> Result<Vec<Report>, ViewError> {
        debug!("my_reports() called");

        let profile = self.profile().await?;
        let reports = self
            .ctx
            .call(self.ctx.api.reports(&self.ctx.token, None))
            .await?;

        let names: Vec<&str> = [&profile.name, &profile.username, &profile.email]
            .into_iter()
            .filter_map(|n| n.as_deref())
            .collect();

        Ok(reports
            .into_iter()
            .filter(|r| {
                r.inspector_name
                    .as_deref()
                    .is_some_and(|inspector| names.contains(&inspector))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend_client::MockBackendApi, views::test_context};

    fn report(id: &str, inspector: &str) -> Report {
        Report {
            id: id.to_string(),
            inspector_name: Some(inspector.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn supervisor_is_denied() {
        let (ctx, _rx) = test_context(Role::Supervisor, MockBackendApi::default());
        assert!(matches!(
            InspectorDashboard::new(ctx),
            Err(ViewError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn submit_report_posts_valid_report() {
        let mut api = MockBackendApi::default();
        api.expect_create_report()
            .withf(|token, report| token == "tok1" && report.location == "Bridge 4")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(report("r-7", "Ana")) }));

        let (ctx, _rx) = test_context(Role::Inspector, api);
        let created = InspectorDashboard::new(ctx)
            .unwrap()
            .submit_report(NewReport {
                location: "Bridge 4".to_string(),
                description: "Hairline crack on pillar 2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.id, "r-7");
    }

    #[tokio::test]
    async fn incomplete_report_is_not_sent() {
        let mut api = MockBackendApi::default();
        api.expect_create_report().never();

        let (ctx, _rx) = test_context(Role::Inspector, api);
        let result = InspectorDashboard::new(ctx)
            .unwrap()
            .submit_report(NewReport::default())
            .await;

        assert!(matches!(result, Err(ViewError::Validation(_))));
    }

    #[tokio::test]
    async fn my_reports_keeps_own_reports() {
        let mut api = MockBackendApi::default();
        api.expect_me().returning(|_| {
            Box::pin(async {
                Ok(UserProfile {
                    role: "inspector".to_string(),
                    name: Some("Ana".to_string()),
                    ..Default::default()
                })
            })
        });
        api.expect_reports().returning(|_, _| {
            Box::pin(async { Ok(vec![report("r-1", "Ana"), report("r-2", "Luis")]) })
        });

        let (ctx, _rx) = test_context(Role::Inspector, api);
        let reports = InspectorDashboard::new(ctx)
            .unwrap()
            .my_reports()
            .await
            .unwrap();

        assert_eq!(reports, [report("r-1", "Ana")]);
    }
}

//! The progress aggregator.
//!
//! Every operation checks access before it reads any log row, then reduces
//! the fetched rows with the pure functions in [`crate::progress`]. A failed
//! fetch aborts the whole call.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::{ensure_access, ensure_reviewer};
use crate::clock::Clock;
use crate::error::ProgressError;
use crate::export::export_rows;
use crate::models::{
    ActivityItem, DashboardOverview, ExportParams, InternDashboard, InternOverview, LogExportRow,
    LogRecord, OverviewOrder, PendingVerification, Requester, Role, User, VerificationStatus,
};
use crate::progress::{rotation_progress, summarize};
use crate::store::ProgressStore;

pub const DEFAULT_RECENT_ACTIVITY_LIMIT: usize = 10;

pub struct ProgressService<S> {
    store: S,
    clock: Clock,
    recent_activity_limit: usize,
}

impl<S: ProgressStore> ProgressService<S> {
    pub fn new(store: S, clock: Clock) -> Self {
        ProgressService {
            store,
            clock,
            recent_activity_limit: DEFAULT_RECENT_ACTIVITY_LIMIT,
        }
    }

    pub fn with_recent_activity_limit(mut self, limit: usize) -> Self {
        self.recent_activity_limit = limit;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Looks up the user a request is made on behalf of.
    pub async fn resolve_requester(&self, user_id: Uuid) -> Result<Requester, ProgressError> {
        let user = self.require_user(user_id, "user").await?;
        Ok(Requester::from(&user))
    }

    pub async fn compute_intern_dashboard(
        &self,
        requester: &Requester,
        intern_id: Uuid,
    ) -> Result<InternDashboard, ProgressError> {
        if let Err(err) = ensure_access(requester, intern_id) {
            warn!(requester = %requester.id, %intern_id, "dashboard access denied");
            return Err(err);
        }

        let intern = self.require_intern(intern_id).await?;
        let requirements = self
            .store
            .active_requirements()
            .await
            .map_err(ProgressError::retrieval)?;
        let logs = self
            .store
            .logs_for_intern(intern_id)
            .await
            .map_err(ProgressError::retrieval)?;
        debug!(%intern_id, requirements = requirements.len(), logs = logs.len(), "computing dashboard");

        let rotations = rotation_progress(&requirements, &logs);
        let summary = summarize(&rotations);

        Ok(InternDashboard {
            intern_id,
            intern_name: intern.full_name,
            summary,
            rotations,
            pending_verifications: self.pending_verifications(&logs),
            recent_activity: self.recent_activity(&logs),
        })
    }

    pub async fn compute_dashboard_overview(
        &self,
        requester: &Requester,
        order: OverviewOrder,
    ) -> Result<DashboardOverview, ProgressError> {
        if let Err(err) = ensure_reviewer(requester) {
            warn!(requester = %requester.id, "overview access denied");
            return Err(err);
        }

        let interns = self
            .store
            .list_interns()
            .await
            .map_err(ProgressError::retrieval)?;
        let requirements = self
            .store
            .active_requirements()
            .await
            .map_err(ProgressError::retrieval)?;
        let logs = self.store.all_logs().await.map_err(ProgressError::retrieval)?;

        let window_start = self.clock.activity_window_start();
        let pending_verifications = logs
            .iter()
            .filter(|log| log.status == VerificationStatus::Pending)
            .count();
        let recent_activity_count = logs
            .iter()
            .filter(|log| log.created_at >= window_start && log.created_at <= self.clock.now())
            .count();

        let mut by_intern: HashMap<Uuid, Vec<LogRecord>> = HashMap::new();
        for log in logs {
            by_intern.entry(log.intern_id).or_default().push(log);
        }

        let mut summaries: Vec<InternOverview> = interns
            .iter()
            .map(|intern| {
                let intern_logs = by_intern.get(&intern.id).map(Vec::as_slice).unwrap_or(&[]);
                let summary = summarize(&rotation_progress(&requirements, intern_logs));
                InternOverview {
                    intern_id: intern.id,
                    intern_name: intern.full_name.clone(),
                    verified: summary.verified,
                    pending: summary.pending,
                    over_achieved: summary.over_achieved,
                    completion_percentage: summary.completion_percentage,
                }
            })
            .collect();

        match order {
            OverviewOrder::Id => summaries.sort_by(|a, b| a.intern_id.cmp(&b.intern_id)),
            OverviewOrder::Name => summaries.sort_by(|a, b| {
                a.intern_name
                    .cmp(&b.intern_name)
                    .then_with(|| a.intern_id.cmp(&b.intern_id))
            }),
        }

        info!(
            interns = summaries.len(),
            pending_verifications, recent_activity_count, "computed dashboard overview"
        );

        Ok(DashboardOverview {
            total_interns: interns.len(),
            pending_verifications,
            recent_activity_count,
            interns: summaries,
        })
    }

    pub async fn export_logs(
        &self,
        requester: &Requester,
        params: &ExportParams,
    ) -> Result<Vec<LogExportRow>, ProgressError> {
        if let Err(err) = ensure_access(requester, params.user_id) {
            warn!(requester = %requester.id, user_id = %params.user_id, "export access denied");
            return Err(err);
        }

        self.require_user(params.user_id, "user").await?;
        let logs = self
            .store
            .logs_for_intern(params.user_id)
            .await
            .map_err(ProgressError::retrieval)?;

        let rows = export_rows(&logs, params, &self.clock);
        debug!(user_id = %params.user_id, rows = rows.len(), "exported logs");
        Ok(rows)
    }

    async fn require_user(&self, id: Uuid, kind: &'static str) -> Result<User, ProgressError> {
        self.store
            .find_user(id)
            .await
            .map_err(ProgressError::retrieval)?
            .ok_or(ProgressError::NotFound { kind, id })
    }

    async fn require_intern(&self, id: Uuid) -> Result<User, ProgressError> {
        let user = self.require_user(id, "intern").await?;
        if user.role != Role::Intern {
            return Err(ProgressError::NotFound { kind: "intern", id });
        }
        Ok(user)
    }

    fn pending_verifications(&self, logs: &[LogRecord]) -> Vec<PendingVerification> {
        let mut pending: Vec<&LogRecord> = logs
            .iter()
            .filter(|log| log.status == VerificationStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.performed_at.cmp(&b.performed_at).then_with(|| a.id.cmp(&b.id)));

        pending
            .into_iter()
            .map(|log| PendingVerification {
                log_entry_id: log.id,
                procedure_name: log.procedure_name.clone(),
                rotation_name: log.rotation_name.clone(),
                date: self.clock.local_date(log.performed_at),
                count: log.count,
            })
            .collect()
    }

    fn recent_activity(&self, logs: &[LogRecord]) -> Vec<ActivityItem> {
        let mut recent: Vec<&LogRecord> = logs.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        recent
            .into_iter()
            .take(self.recent_activity_limit)
            .map(|log| ActivityItem {
                log_entry_id: log.id,
                procedure_name: log.procedure_name.clone(),
                date: self.clock.local_date(log.performed_at),
                count: log.count,
                status: log.status,
                created_at: log.created_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DEFAULT_TIMEZONE;
    use crate::progress::tests::{log, requirement};
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: MemoryStore,
        intern: User,
        tutor: User,
        icu: Uuid,
        line: Uuid,
    }

    fn user(name: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@hospital.test", name.to_lowercase().replace(' ', ".")),
            role,
        }
    }

    fn fixture() -> Fixture {
        let intern = user("Noa Levi", Role::Intern);
        let tutor = user("Dr Cohen", Role::Tutor);
        let icu = Uuid::new_v4();
        let line = Uuid::new_v4();
        let store = MemoryStore {
            users: vec![intern.clone(), tutor.clone()],
            requirements: vec![requirement(icu, "ICU", line, 5)],
            ..MemoryStore::default()
        };
        Fixture {
            store,
            intern,
            tutor,
            icu,
            line,
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).unwrap()
    }

    fn service(store: MemoryStore) -> ProgressService<MemoryStore> {
        ProgressService::new(store, Clock::fixed(now(), DEFAULT_TIMEZONE))
    }

    #[tokio::test]
    async fn dashboard_rolls_up_verified_and_pending() {
        let mut f = fixture();
        for status in [VerificationStatus::Approved; 3] {
            f.store.logs.push(log(f.intern.id, f.icu, f.line, status, 1));
        }
        f.store
            .logs
            .push(log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 2));
        let requester = Requester::from(&f.intern);
        let intern_id = f.intern.id;

        let dashboard = service(f.store)
            .compute_intern_dashboard(&requester, intern_id)
            .await
            .unwrap();

        assert_eq!(dashboard.rotations.len(), 1);
        assert_eq!(dashboard.summary.verified, 3);
        assert_eq!(dashboard.summary.pending, 2);
        assert_eq!(dashboard.summary.completion_percentage, 60);
        assert_eq!(dashboard.pending_verifications.len(), 1);
        assert_eq!(dashboard.recent_activity.len(), 4);
    }

    #[tokio::test]
    async fn intern_cannot_read_another_dashboard() {
        let mut f = fixture();
        let other = user("Yael Katz", Role::Intern);
        f.store.users.push(other.clone());
        // Offline store proves no fetch happens before the denial.
        f.store.offline = true;

        let err = service(f.store)
            .compute_intern_dashboard(&Requester::from(&f.intern), other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn tutor_reads_any_dashboard() {
        let f = fixture();
        let dashboard = service(f.store)
            .compute_intern_dashboard(&Requester::from(&f.tutor), f.intern.id)
            .await
            .unwrap();
        assert_eq!(dashboard.summary.verified, 0);
        assert_eq!(dashboard.summary.completion_percentage, 0);
    }

    #[tokio::test]
    async fn unknown_or_non_intern_is_not_found() {
        let f = fixture();
        let requester = Requester::from(&f.tutor);
        let tutor_id = f.tutor.id;
        let service = service(f.store);

        let missing = service
            .compute_intern_dashboard(&requester, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(missing, ProgressError::NotFound { .. }));

        let not_intern = service
            .compute_intern_dashboard(&requester, tutor_id)
            .await
            .unwrap_err();
        assert!(matches!(not_intern, ProgressError::NotFound { .. }));
    }

    #[tokio::test]
    async fn store_failure_is_a_retrieval_failure() {
        let mut f = fixture();
        f.store.offline = true;
        let err = service(f.store)
            .compute_intern_dashboard(&Requester::from(&f.tutor), f.intern.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::RetrievalFailure(_)));
    }

    #[tokio::test]
    async fn recent_activity_is_bounded_and_newest_first() {
        let mut f = fixture();
        for minutes in 0..4 {
            let mut record = log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 1);
            record.created_at = now() - Duration::minutes(minutes);
            f.store.logs.push(record);
        }
        let requester = Requester::from(&f.intern);
        let intern_id = f.intern.id;

        let dashboard = service(f.store)
            .with_recent_activity_limit(2)
            .compute_intern_dashboard(&requester, intern_id)
            .await
            .unwrap();
        assert_eq!(dashboard.recent_activity.len(), 2);
        assert_eq!(dashboard.recent_activity[0].created_at, now());
    }

    #[tokio::test]
    async fn overview_lists_every_intern_in_id_order() {
        let mut f = fixture();
        let idle = user("Amir Haddad", Role::Intern);
        f.store.users.push(idle.clone());
        let mut approved = log(f.intern.id, f.icu, f.line, VerificationStatus::Approved, 5);
        approved.created_at = now() - Duration::days(2);
        let mut pending = log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 1);
        pending.created_at = now() - Duration::days(10);
        f.store.logs.extend([approved, pending]);
        let tutor = Requester::from(&f.tutor);
        let intern_id = f.intern.id;

        let overview = service(f.store)
            .compute_dashboard_overview(&tutor, OverviewOrder::Id)
            .await
            .unwrap();

        assert_eq!(overview.total_interns, 2);
        assert_eq!(overview.interns.len(), 2);
        assert_eq!(overview.pending_verifications, 1);
        assert_eq!(overview.recent_activity_count, 1);
        assert!(overview.interns[0].intern_id < overview.interns[1].intern_id);

        let idle_row = overview.interns.iter().find(|i| i.intern_id == idle.id).unwrap();
        assert_eq!(idle_row.verified, 0);
        assert_eq!(idle_row.completion_percentage, 0);
        let busy_row = overview.interns.iter().find(|i| i.intern_id == intern_id).unwrap();
        assert_eq!(busy_row.completion_percentage, 100);
    }

    #[tokio::test]
    async fn pending_verifications_are_oldest_first() {
        let mut f = fixture();
        for day in [12, 3, 7] {
            let mut record = log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 1);
            record.performed_at = Utc.with_ymd_and_hms(2026, 3, day, 8, 0, 0).unwrap();
            f.store.logs.push(record);
        }
        let requester = Requester::from(&f.intern);
        let intern_id = f.intern.id;

        let dashboard = service(f.store)
            .compute_intern_dashboard(&requester, intern_id)
            .await
            .unwrap();
        let days: Vec<String> = dashboard
            .pending_verifications
            .iter()
            .map(|pending| pending.date.to_string())
            .collect();
        assert_eq!(days, vec!["2026-03-03", "2026-03-07", "2026-03-12"]);
    }

    #[tokio::test]
    async fn overview_counts_pending_entries_not_procedures() {
        let mut f = fixture();
        f.store
            .logs
            .push(log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 4));
        f.store
            .logs
            .push(log(f.intern.id, f.icu, f.line, VerificationStatus::Pending, 3));
        let tutor = Requester::from(&f.tutor);

        let overview = service(f.store)
            .compute_dashboard_overview(&tutor, OverviewOrder::Id)
            .await
            .unwrap();
        assert_eq!(overview.pending_verifications, 2);
        assert_eq!(overview.interns[0].pending, 7);
    }

    #[tokio::test]
    async fn activity_window_edge_is_local_midnight_six_days_back() {
        let mut f = fixture();
        // Window opens March 14th 00:00 in Jerusalem, 22:00 UTC the day before.
        let edge = Utc.with_ymd_and_hms(2026, 3, 13, 22, 0, 0).unwrap();
        for created_at in [
            edge - Duration::minutes(1),
            edge,
            edge + Duration::minutes(1),
        ] {
            let mut record = log(f.intern.id, f.icu, f.line, VerificationStatus::Approved, 1);
            record.created_at = created_at;
            f.store.logs.push(record);
        }
        let tutor = Requester::from(&f.tutor);

        let overview = service(f.store)
            .compute_dashboard_overview(&tutor, OverviewOrder::Id)
            .await
            .unwrap();
        assert_eq!(overview.recent_activity_count, 2);
    }

    #[tokio::test]
    async fn overview_can_sort_by_name() {
        let mut f = fixture();
        f.store.users.push(user("Amir Haddad", Role::Intern));
        let overview = service(f.store)
            .compute_dashboard_overview(&Requester::from(&f.tutor), OverviewOrder::Name)
            .await
            .unwrap();
        let names: Vec<&str> = overview.interns.iter().map(|i| i.intern_name.as_str()).collect();
        assert_eq!(names, vec!["Amir Haddad", "Noa Levi"]);
    }

    #[tokio::test]
    async fn interns_cannot_see_overview() {
        let f = fixture();
        let err = service(f.store)
            .compute_dashboard_overview(&Requester::from(&f.intern), OverviewOrder::Id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn export_checks_ownership_first() {
        let f = fixture();
        let other = Uuid::new_v4();
        let params = ExportParams::parse(other, None, None).unwrap();
        let err = service(f.store)
            .export_logs(&Requester::from(&f.intern), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn export_returns_own_rows() {
        let mut f = fixture();
        f.store
            .logs
            .push(log(f.intern.id, f.icu, f.line, VerificationStatus::Approved, 2));
        let params = ExportParams::parse(f.intern.id, Some("2026-03-01"), Some("2026-03-31")).unwrap();
        let rows = service(f.store)
            .export_logs(&Requester::from(&f.intern), &params)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2026-03-10");
        assert_eq!(rows[0].status, VerificationStatus::Approved);
    }
}

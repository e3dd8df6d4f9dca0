use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use domains::activity::{at_risk_rows, sort_rows, SortDirection, TrackerRow, TrackerSort};
use domains::calendar::CheckSchedule;
use domains::policy::{authorize, Action, Actor};
use domains::ports::{CharacterRepo, CheckLog, EventPublisher};
use domains::{CharacterId, CharacterStatus, Clock, DomainEvent, Result};

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub cutoff_date: NaiveDate,
    pub deactivated: Vec<CharacterId>,
    /// Characters skipped because the store failed for them.
    pub failed: Vec<CharacterId>,
}

#[derive(Clone)]
pub struct ActivityService {
    characters: Arc<dyn CharacterRepo>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    window_days: u32,
}

impl ActivityService {
    pub fn new(
        characters: Arc<dyn CharacterRepo>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        window_days: u32,
    ) -> Self {
        Self {
            characters,
            clock,
            events,
            window_days,
        }
    }

    /// Upcoming check and its cutoff, for display.
    pub fn schedule(&self) -> CheckSchedule {
        CheckSchedule::at(self.clock.now(), self.window_days)
    }

    /// Flips every stale Active character to Inactive.
    ///
    /// Each character is re-checked and written inside the store, so a post
    /// landing mid-pass is never overwritten. A store failure for one
    /// character is logged and the pass moves on.
    #[instrument(skip(self), fields(cutoff = %cutoff))]
    pub async fn evaluate(&self, cutoff: NaiveDate) -> Result<EvaluationReport> {
        let candidates = self
            .characters
            .list_characters(Some(CharacterStatus::Active))
            .await?;
        let now = self.clock.now();

        let mut report = EvaluationReport {
            cutoff_date: cutoff,
            deactivated: Vec::new(),
            failed: Vec::new(),
        };
        for character in candidates.iter().filter(|c| c.is_stale(cutoff)) {
            match self.characters.deactivate_if_stale(character.id, cutoff, now).await {
                Ok(true) => {
                    info!(character_id = %character.id, "character marked inactive");
                    self.events.publish(DomainEvent::CharacterDeactivated {
                        character_id: character.id,
                        cutoff_date: cutoff,
                    });
                    report.deactivated.push(character.id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(character_id = %character.id, error = %e, "activity evaluation failed for character");
                    report.failed.push(character.id);
                }
            }
        }
        info!(
            deactivated = report.deactivated.len(),
            failed = report.failed.len(),
            "activity evaluation finished"
        );
        Ok(report)
    }

    /// Staff-triggered pass against the check that most recently came due.
    pub async fn run_check(&self, actor: Option<&Actor>) -> Result<EvaluationReport> {
        let actor = authorize(actor, Action::RunActivityCheck)?;
        let schedule = CheckSchedule::latest(self.clock.now(), self.window_days);
        info!(user_id = %actor.user_id, check_date = %schedule.next_check_date, "manual activity check");
        self.evaluate(schedule.cutoff_date).await
    }

    /// Characters the upcoming check would deactivate.
    pub async fn tracker(
        &self,
        sort: TrackerSort,
        direction: SortDirection,
    ) -> Result<(CheckSchedule, Vec<TrackerRow>)> {
        let schedule = self.schedule();
        let active = self
            .characters
            .list_characters(Some(CharacterStatus::Active))
            .await?;
        let mut rows = at_risk_rows(&active, schedule.cutoff_date);
        sort_rows(&mut rows, sort, direction);
        Ok((schedule, rows))
    }
}

/// Runs the evaluation once per check date.
///
/// Completed checks go to the [`CheckLog`], so a check date that passed while
/// the process was down is evaluated on the first tick afterwards. With
/// nothing logged yet the job waits for the next check date.
pub struct ActivityJob {
    service: ActivityService,
    checks: Arc<dyn CheckLog>,
    running: Mutex<()>,
}

impl ActivityJob {
    pub fn new(service: ActivityService, checks: Arc<dyn CheckLog>) -> Self {
        Self {
            service,
            checks,
            running: Mutex::new(()),
        }
    }

    /// Returns the report when this tick performed the pass.
    pub async fn tick(&self) -> Result<Option<EvaluationReport>> {
        let _running = self.running.lock().await;
        let now = self.service.clock.now();
        let due = CheckSchedule::latest(now, self.service.window_days);

        let last = self.checks.last_completed_check().await?;
        if last.is_some_and(|done| done >= due.next_check_date) {
            return Ok(None);
        }
        if now.date_naive() != due.next_check_date {
            let Some(done) = last else {
                return Ok(None);
            };
            warn!(missed = %due.next_check_date, last_completed = %done, "catching up on a missed activity check");
        }

        let report = self.service.evaluate(due.cutoff_date).await?;
        self.checks.record_completed_check(due.next_check_date, now).await?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use domains::calendar::start_of_day;
    use domains::ports::{MockCharacterRepo, MockCheckLog, MockEventPublisher};
    use domains::{Character, DomainError, ManualClock, UserId};
    use tokio_test::{assert_err, assert_ok};

    fn check_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 1, 0, 0).unwrap()
    }

    fn character(last_post: Option<DateTime<Utc>>) -> Character {
        let mut c = Character::new(UserId::new(), "Ash", check_day() - Duration::days(90));
        c.last_ic_post_at = last_post;
        c
    }

    fn service(repo: MockCharacterRepo, events: MockEventPublisher, now: DateTime<Utc>) -> ActivityService {
        ActivityService::new(
            Arc::new(repo),
            Arc::new(ManualClock::new(now)),
            Arc::new(events),
            7,
        )
    }

    #[tokio::test]
    async fn one_failing_character_does_not_abort_the_pass() {
        let (a, b) = (character(None), character(None));
        let (a_id, b_id) = (a.id, b.id);

        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters()
            .returning(move |_| Ok(vec![a.clone(), b.clone()]));
        repo.expect_deactivate_if_stale()
            .returning(move |id, _, _| {
                if id == a_id {
                    Err(DomainError::Storage("connection reset".into()))
                } else {
                    Ok(true)
                }
            });
        let mut events = MockEventPublisher::new();
        events.expect_publish().times(1).return_const(());

        let svc = service(repo, events, check_day());
        let report = assert_ok!(svc.evaluate(svc.schedule().cutoff_date).await);

        assert_eq!(report.failed, vec![a_id]);
        assert_eq!(report.deactivated, vec![b_id]);
    }

    #[tokio::test]
    async fn characters_inside_the_window_are_not_touched() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 3, 24).unwrap();
        let fresh = character(Some(start_of_day(cutoff) + Duration::hours(3)));

        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters()
            .returning(move |_| Ok(vec![fresh.clone()]));
        repo.expect_deactivate_if_stale().never();

        let svc = service(repo, MockEventPublisher::new(), check_day());
        let report = assert_ok!(svc.evaluate(cutoff).await);
        assert!(report.deactivated.is_empty());
    }

    #[tokio::test]
    async fn manual_check_needs_staff() {
        let svc = service(MockCharacterRepo::new(), MockEventPublisher::new(), check_day());
        let member = Actor::member(UserId::new());
        let err = assert_err!(svc.run_check(Some(&member)).await);
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn check_log(last: Option<NaiveDate>) -> MockCheckLog {
        let mut log = MockCheckLog::new();
        log.expect_last_completed_check().returning(move || Ok(last));
        log
    }

    #[tokio::test]
    async fn job_waits_for_the_first_check_date() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters().never();
        let mut log = check_log(None);
        log.expect_record_completed_check().never();

        let svc = service(repo, MockEventPublisher::new(), check_day() - Duration::days(1));
        let job = ActivityJob::new(svc, Arc::new(log));
        assert_eq!(assert_ok!(job.tick().await), None);
    }

    #[tokio::test]
    async fn job_runs_on_check_day_and_records_it() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters().times(1).returning(|_| Ok(vec![]));
        let mut log = check_log(Some(date(2026, 2, 28)));
        log.expect_record_completed_check()
            .withf(|check, _| *check == date(2026, 3, 31))
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(repo, MockEventPublisher::new(), check_day());
        let job = ActivityJob::new(svc, Arc::new(log));
        let report = assert_ok!(job.tick().await).expect("check day");
        assert_eq!(report.cutoff_date, date(2026, 3, 24));
    }

    #[tokio::test]
    async fn job_skips_a_check_already_logged() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters().never();
        let mut log = check_log(Some(date(2026, 3, 31)));
        log.expect_record_completed_check().never();

        let svc = service(repo, MockEventPublisher::new(), check_day() + Duration::hours(5));
        let job = ActivityJob::new(svc, Arc::new(log));
        assert_eq!(assert_ok!(job.tick().await), None);
    }

    #[tokio::test]
    async fn job_catches_up_on_a_missed_check() {
        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters().times(1).returning(|_| Ok(vec![]));
        let mut log = check_log(Some(date(2026, 2, 28)));
        log.expect_record_completed_check()
            .withf(|check, _| *check == date(2026, 3, 31))
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(repo, MockEventPublisher::new(), check_day() + Duration::days(3));
        let job = ActivityJob::new(svc, Arc::new(log));
        let report = assert_ok!(job.tick().await).expect("missed check");
        assert_eq!(report.cutoff_date, date(2026, 3, 24));
    }

    #[tokio::test]
    async fn tracker_sorts_at_risk_characters() {
        let old = character(Some(check_day() - Duration::days(60)));
        let never = character(None);
        let never_id = never.id;

        let mut repo = MockCharacterRepo::new();
        repo.expect_list_characters()
            .returning(move |_| Ok(vec![old.clone(), never.clone()]));

        let svc = service(repo, MockEventPublisher::new(), check_day() - Duration::days(10));
        let (schedule, rows) = assert_ok!(svc.tracker(TrackerSort::LastIcPostAt, SortDirection::Asc).await);

        assert_eq!(schedule.cutoff_date, NaiveDate::from_ymd_opt(2026, 3, 24).unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].character_id, never_id);
    }
}

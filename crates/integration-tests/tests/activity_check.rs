mod common;

use chrono::{Duration, NaiveDate};
use common::{ts, World};
use domains::{CharacterStatus, DomainError, DomainEvent};
use services::ActivityJob;
use tokio_test::{assert_err, assert_ok};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn silent_characters_go_inactive_and_recent_posters_stay() {
    let world = World::at(ts(2026, 2, 1, 9));
    let owner = World::member();
    let staff = World::moderator();

    let silent = world.character(&owner, "Silent").await;
    let recent = world.character(&owner, "Recent").await;

    // 40 days before the 2026-03-24 cutoff
    world.clock.set(ts(2026, 2, 12, 9));
    world.ic_thread(&owner, silent.id).await;

    // Two days before the check date, inside the window
    world.clock.set(ts(2026, 3, 29, 9));
    world.ic_thread(&owner, recent.id).await;

    world.clock.set(ts(2026, 3, 31, 20));
    let report = world.services.activity.run_check(Some(&staff)).await.unwrap();

    assert_eq!(report.cutoff_date, date(2026, 3, 24));
    assert_eq!(report.deactivated, vec![silent.id]);
    assert!(report.failed.is_empty());
    assert_eq!(world.reload(silent.id).await.status, CharacterStatus::Inactive);
    assert_eq!(world.reload(recent.id).await.status, CharacterStatus::Active);
}

#[tokio::test]
async fn evaluating_twice_yields_the_same_inactive_set() {
    let world = World::at(ts(2026, 3, 1, 9));
    let owner = World::member();
    let a = world.character(&owner, "A").await;
    let b = world.character(&owner, "B").await;
    world.clock.set(ts(2026, 3, 25, 9));
    world.ic_thread(&owner, b.id).await;

    let cutoff = date(2026, 3, 24);
    let first = world.services.activity.evaluate(cutoff).await.unwrap();
    let second = world.services.activity.evaluate(cutoff).await.unwrap();

    assert_eq!(first.deactivated, vec![a.id]);
    assert!(second.deactivated.is_empty());
    let inactive = world
        .services
        .characters
        .list(Some(CharacterStatus::Inactive))
        .await
        .unwrap();
    assert_eq!(inactive.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id]);
}

#[tokio::test]
async fn evaluation_announces_each_deactivation() {
    let world = World::at(ts(2026, 3, 1, 9));
    let owner = World::member();
    let quiet = world.character(&owner, "Quiet").await;
    let mut rx = world.events.subscribe();

    world.services.activity.evaluate(date(2026, 3, 24)).await.unwrap();

    match rx.try_recv().unwrap() {
        DomainEvent::CharacterDeactivated {
            character_id,
            cutoff_date,
        } => {
            assert_eq!(character_id, quiet.id);
            assert_eq!(cutoff_date, date(2026, 3, 24));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn scheduled_job_runs_once_on_each_check_date() {
    let world = World::at(ts(2026, 3, 30, 23));
    let owner = World::member();
    world.character(&owner, "Early").await;
    let job = ActivityJob::new(world.services.activity.clone(), world.store.clone());

    assert_eq!(job.tick().await.unwrap(), None);

    world.clock.set(ts(2026, 3, 31, 0));
    let report = job.tick().await.unwrap().expect("check date reached");
    assert_eq!(report.deactivated.len(), 1);

    world.clock.advance(Duration::hours(12));
    assert_eq!(job.tick().await.unwrap(), None);

    world.character(&owner, "Late").await;
    world.clock.set(ts(2026, 4, 30, 1));
    let report = job.tick().await.unwrap().expect("next month's check");
    assert_eq!(report.cutoff_date, date(2026, 4, 23));
    assert_eq!(report.deactivated.len(), 1);
}

#[tokio::test]
async fn restarted_job_catches_up_on_a_missed_check() {
    let world = World::at(ts(2026, 3, 31, 2));
    let owner = World::member();
    let job = ActivityJob::new(world.services.activity.clone(), world.store.clone());
    assert!(job.tick().await.unwrap().is_some());

    world.clock.set(ts(2026, 4, 10, 9));
    let quiet = world.character(&owner, "Quiet").await;
    drop(job);

    // Down for the whole of April 30th.
    world.clock.set(ts(2026, 5, 3, 8));
    let restarted = ActivityJob::new(world.services.activity.clone(), world.store.clone());
    let report = restarted.tick().await.unwrap().expect("missed check");
    assert_eq!(report.cutoff_date, date(2026, 4, 23));
    assert_eq!(report.deactivated, vec![quiet.id]);

    world.clock.advance(Duration::hours(1));
    assert_eq!(restarted.tick().await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_reply_racing_the_evaluation_is_never_lost() {
    for _ in 0..16 {
        let world = World::at(ts(2026, 3, 31, 12));
        let owner = World::member();
        let scene_owner = World::member();
        let partner = world.character(&scene_owner, "Partner").await;
        let thread_id = world.ic_thread(&scene_owner, partner.id).await.thread.id;

        world.clock.set(ts(2026, 1, 2, 9));
        let wren_id = world.character(&owner, "Wren").await.id;
        world.clock.set(ts(2026, 3, 31, 12));
        let cutoff = world.services.activity.schedule().cutoff_date;

        let posts = world.services.posts.clone();
        let reply = tokio::spawn(async move {
            posts
                .reply(
                    Some(&owner),
                    thread_id,
                    services::NewPost {
                        character_id: Some(wren_id),
                        content: "Still watching the ford.".into(),
                    },
                )
                .await
        });
        let activity = world.services.activity.clone();
        let pass = tokio::spawn(async move { activity.evaluate(cutoff).await });

        let reply = reply.await.unwrap();
        pass.await.unwrap().unwrap();
        let wren = world.reload(wren_id).await;
        let wren_posts = world
            .services
            .posts
            .view_thread(thread_id)
            .await
            .unwrap()
            .posts
            .iter()
            .filter(|p| p.author.character() == Some(wren_id))
            .count();

        match reply {
            Ok(_) => {
                assert_eq!(wren.status, CharacterStatus::Active);
                assert_eq!(wren.last_ic_post_at, Some(ts(2026, 3, 31, 12)));
                assert_eq!(wren_posts, 1);
            }
            Err(e) => {
                assert!(matches!(e, DomainError::Forbidden(_)), "unexpected error {e}");
                assert_eq!(wren.status, CharacterStatus::Inactive);
                assert_eq!(wren.last_ic_post_at, None);
                assert_eq!(wren_posts, 0);
            }
        }
    }
}

#[tokio::test]
async fn reactivation_needs_a_new_post_and_an_explicit_request() {
    let world = World::at(ts(2026, 3, 1, 9));
    let owner = World::member();
    let c = world.character(&owner, "Wren").await;
    world.clock.set(ts(2026, 3, 31, 9));
    world.services.activity.evaluate(date(2026, 3, 24)).await.unwrap();

    let err = world.services.characters.reactivate(Some(&owner), c.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Ineligible(_)));

    // Hidden from the dropdown, so the owner cannot write as them yet
    world.clock.advance(Duration::hours(1));
    let other_owner = World::member();
    let host = world.character(&other_owner, "Host").await;
    let scene = world.ic_thread(&other_owner, host.id).await;
    let blocked = world
        .services
        .posts
        .reply(
            Some(&owner),
            scene.thread.id,
            services::NewPost {
                character_id: Some(c.id),
                content: "I'm back.".into(),
            },
        )
        .await;
    assert!(matches!(blocked, Err(DomainError::Forbidden(_))));

    assert_ok!(world.services.characters.set_show_in_dropdown(Some(&owner), c.id, true).await);
    world.clock.advance(Duration::hours(1));
    world.reply(&owner, scene.thread.id, c.id).await;

    // Posting alone never reactivates
    assert_eq!(world.reload(c.id).await.status, CharacterStatus::Inactive);

    let stranger = World::member();
    assert_err!(world.services.characters.reactivate(Some(&stranger), c.id).await);

    let back = world.services.characters.reactivate(Some(&owner), c.id).await.unwrap();
    assert_eq!(back.status, CharacterStatus::Active);
    assert!(back.show_in_dropdown);
}

#[tokio::test]
async fn death_is_staff_only_and_final_for_the_activity_check() {
    let world = World::at(ts(2026, 3, 1, 9));
    let owner = World::member();
    let staff = World::moderator();
    let c = world.character(&owner, "Doomed").await;

    let err = world.services.characters.mark_dead(Some(&owner), c.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Unauthorized(_)));

    let dead = world.services.characters.mark_dead(Some(&staff), c.id).await.unwrap();
    assert_eq!(dead.status, CharacterStatus::Dead);
    assert!(!dead.show_in_dropdown);

    let err = world.services.characters.mark_dead(Some(&staff), c.id).await.unwrap_err();
    assert!(err.is_conflict());

    let report = world.services.activity.evaluate(date(2026, 3, 24)).await.unwrap();
    assert!(report.deactivated.is_empty());
    assert_eq!(world.reload(c.id).await.status, CharacterStatus::Dead);
}

#[tokio::test]
async fn tracker_lists_only_characters_at_risk() {
    let world = World::at(ts(2026, 3, 2, 9));
    let owner = World::member();
    let quiet = world.character(&owner, "Quiet").await;
    let active = world.character(&owner, "Active").await;
    world.clock.set(ts(2026, 3, 26, 9));
    world.ic_thread(&owner, active.id).await;

    let (schedule, rows) = world
        .services
        .activity
        .tracker(Default::default(), Default::default())
        .await
        .unwrap();

    assert_eq!(schedule.next_check_date, date(2026, 3, 31));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].character_id, quiet.id);
    assert_eq!(rows[0].last_ic_post_at, None);
    assert_eq!(rows[0].joined_at, ts(2026, 3, 2, 9));
}

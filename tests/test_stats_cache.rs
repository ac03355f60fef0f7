//! Integration tests for the yearly statistics cache on a real library.

mod common;

use common::*;
use dpstash::{
    YearlyStats, YearlyStatsService,
    config::StatsCacheConfig,
    retry::RetryPolicy,
    stats::{CacheUpdate, StatsSource},
};
use time::macros::date;

fn stats_service(library: &LibraryDb) -> anyhow::Result<YearlyStatsService<LibraryDb>> {
    let config = StatsCacheConfig {
        page_size: 2,
        ..Default::default()
    };
    YearlyStatsService::new(library.clone(), config, RetryPolicy::none())
}

async fn seed_projects(user: &UserDb) -> anyhow::Result<Vec<Project>> {
    let mut projects = vec![
        user.add_project(&make_completed_project("Fox", date!(2024 - 02 - 10), 10_000))
            .await?,
        user.add_project(&make_completed_project("Bear", date!(2024 - 11 - 30), 25_000))
            .await?,
        user.add_project(&make_completed_project("Deer", date!(2023 - 06 - 01), 5_000))
            .await?,
    ];
    let mut started = make_new_project("Heron", ProjectStatus::Progress);
    started.date_started = Some(date!(2024 - 03 - 03));
    started.date_purchased = Some(date!(2023 - 12 - 20));
    projects.push(user.add_project(&started).await?);
    let mut bought = make_new_project("Wren", ProjectStatus::Stash);
    bought.date_purchased = Some(date!(2024 - 07 - 07));
    projects.push(user.add_project(&bought).await?);
    Ok(projects)
}

#[tokio::test]
async fn test_cached_stats_round_trip() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;
    assert!(user.load_yearly_stats(2024).await?.is_none());

    let mut stats = YearlyStats::empty(2024);
    stats.completed_count = 3;
    stats.total_diamonds = 42_000;
    let stored = user.store_yearly_stats(&stats).await?;
    let loaded = user.load_yearly_stats(2024).await?.unwrap();
    assert_eq!(loaded.stats, stats);
    assert_eq!(
        loaded.last_calculated.unix_timestamp(),
        stored.last_calculated.unix_timestamp()
    );

    user.delete_yearly_stats(2024).await?;
    assert!(user.load_yearly_stats(2024).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_miss_then_hit() -> anyhow::Result<()> {
    let (library, user, _temp_dir) = create_test_user_library().await;
    seed_projects(&user).await?;
    let service = stats_service(&library)?;

    let first = service.get_yearly_stats(user.user_id(), 2024).await;
    assert_eq!(first.source, StatsSource::Realtime);
    assert_eq!(first.stats.total_projects, 5);
    assert_eq!(first.stats.completed_count, 2);
    assert_eq!(first.stats.total_diamonds, 35_000);
    assert_eq!(first.stats.started_count, 3);
    assert_eq!(first.stats.purchased_count, 1);
    assert_eq!(first.stats.in_progress_count, 1);
    assert_eq!(first.stats.status_counts.completed, 3);

    let second = service.get_yearly_stats(user.user_id(), 2024).await;
    assert_eq!(second.source, StatsSource::Cache);
    assert_eq!(second.stats, first.stats);
    assert_eq!(service.pending_refreshes(), 0);

    let metrics = service.metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_hits, 1);

    // Invalidation forces the next read to recompute.
    assert!(service.invalidate(user.user_id(), 2024).await);
    let third = service.get_yearly_stats(user.user_id(), 2024).await;
    assert_eq!(third.source, StatsSource::Realtime);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_share_one_computation() -> anyhow::Result<()> {
    let (library, user, _temp_dir) = create_test_user_library().await;
    seed_projects(&user).await?;
    let service = stats_service(&library)?;

    let results = futures::future::join_all(
        (0..4).map(|_| service.get_yearly_stats(user.user_id(), 2024)),
    )
    .await;

    assert!(results.iter().all(|r| r.stats == results[0].stats));
    assert!(results.iter().all(|r| r.source == StatsSource::Realtime));
    let metrics = service.metrics();
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.deduplicated, 3);
    Ok(())
}

#[tokio::test]
async fn test_deletion_adjusts_cached_stats() -> anyhow::Result<()> {
    let (library, user, _temp_dir) = create_test_user_library().await;
    let projects = seed_projects(&user).await?;
    let service = stats_service(&library)?;
    service.get_yearly_stats(user.user_id(), 2024).await;

    let bear = projects[1].clone();
    let contribution = bear.contribution();
    user.delete_project(bear).await?;
    let update = service
        .apply_project_deletion(user.user_id(), 2024, &contribution)
        .await;
    assert_eq!(update, CacheUpdate::Adjusted);

    let adjusted = service.get_yearly_stats(user.user_id(), 2024).await;
    assert_eq!(adjusted.source, StatsSource::Cache);
    assert_eq!(adjusted.stats.total_projects, 4);
    assert_eq!(adjusted.stats.completed_count, 1);
    assert_eq!(adjusted.stats.total_diamonds, 10_000);

    service.invalidate(user.user_id(), 2024).await;
    let recomputed = service.get_yearly_stats(user.user_id(), 2024).await;
    assert_eq!(recomputed.source, StatsSource::Realtime);
    assert_eq!(recomputed.stats, adjusted.stats);
    Ok(())
}

#[tokio::test]
async fn test_deletion_without_cache_recomputes() -> anyhow::Result<()> {
    let (library, user, _temp_dir) = create_test_user_library().await;
    let projects = seed_projects(&user).await?;
    let service = stats_service(&library)?;

    let fox = projects[0].clone();
    let contribution = fox.contribution();
    user.delete_project(fox).await?;
    let update = service
        .apply_project_deletion(user.user_id(), 2024, &contribution)
        .await;
    assert_eq!(update, CacheUpdate::Recomputed);

    let cached = user.load_yearly_stats(2024).await?.unwrap();
    assert_eq!(cached.stats.total_projects, 4);
    assert_eq!(cached.stats.total_diamonds, 25_000);
    Ok(())
}

#[tokio::test]
async fn test_stats_are_per_user() -> anyhow::Result<()> {
    let (library, alice, _temp_dir) = create_test_user_library().await;
    let bob = library.add_user("bob").await?;
    seed_projects(&alice).await?;
    bob.add_project(&make_completed_project("Solo", date!(2024 - 01 - 01), 1_000))
        .await?;
    let service = stats_service(&library)?;

    let alice_stats = service.get_yearly_stats(alice.user_id(), 2024).await;
    let bob_stats = service.get_yearly_stats(bob.user_id(), 2024).await;
    assert_eq!(alice_stats.stats.total_projects, 5);
    assert_eq!(bob_stats.stats.total_projects, 1);
    assert_eq!(bob_stats.stats.total_diamonds, 1_000);
    assert_eq!(service.metrics().deduplicated, 0);

    // Another year of the same user is a separate cache entry.
    let older = service.get_yearly_stats(alice.user_id(), 2023).await;
    assert_eq!(older.source, StatsSource::Realtime);
    assert_eq!(older.stats.completed_count, 1);
    assert_eq!(older.stats.purchased_count, 1);
    assert!(bob.load_yearly_stats(2023).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_deletion_reaches_other_cached_years() -> anyhow::Result<()> {
    let (library, user, _temp_dir) = create_test_user_library().await;
    let projects = seed_projects(&user).await?;
    let service = stats_service(&library)?;
    let before = service.get_yearly_stats(user.user_id(), 2023).await;
    assert_eq!(before.stats.total_projects, 5);
    assert_eq!(before.stats.status_counts.completed, 3);

    let fox = projects[0].clone();
    let contribution = fox.contribution();
    user.delete_project(fox).await?;
    let updates = service
        .apply_project_deletion_to_user(user.user_id(), 2024, &contribution)
        .await;
    assert_eq!(
        updates,
        vec![(2023, CacheUpdate::Adjusted), (2024, CacheUpdate::Recomputed)]
    );

    let after = service.get_yearly_stats(user.user_id(), 2023).await;
    assert_eq!(after.source, StatsSource::Cache);
    assert_eq!(after.stats.total_projects, 4);
    assert_eq!(after.stats.status_counts.completed, 2);
    assert_eq!(after.stats.completed_count, 1);
    assert_eq!(after.stats.total_diamonds, 5_000);

    service.invalidate(user.user_id(), 2023).await;
    let recomputed = service.get_yearly_stats(user.user_id(), 2023).await;
    assert_eq!(recomputed.source, StatsSource::Realtime);
    assert_eq!(recomputed.stats, after.stats);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_user_drops_every_year() -> anyhow::Result<()> {
    let (library, alice, _temp_dir) = create_test_user_library().await;
    let bob = library.add_user("bob").await?;
    seed_projects(&alice).await?;
    let service = stats_service(&library)?;
    for year in [2023, 2024] {
        service.get_yearly_stats(alice.user_id(), year).await;
    }
    service.get_yearly_stats(bob.user_id(), 2024).await;
    assert_eq!(alice.cached_stats_years().await?, vec![2023, 2024]);

    alice
        .add_project(&make_new_project("Lynx", ProjectStatus::Wishlist))
        .await?;
    assert!(service.invalidate_user(alice.user_id()).await);

    assert!(alice.cached_stats_years().await?.is_empty());
    assert_eq!(bob.cached_stats_years().await?, vec![2024]);
    let older = service.get_yearly_stats(alice.user_id(), 2023).await;
    assert_eq!(older.source, StatsSource::Realtime);
    assert_eq!(older.stats.total_projects, 6);
    Ok(())
}

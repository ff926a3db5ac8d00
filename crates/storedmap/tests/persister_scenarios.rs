use std::time::Duration;

use storedmap::{Driver, SortValue};
use storedmap_test_support::test_store;

#[tokio::test(start_paused = true)]
async fn coalesce_collapses_rapid_mutations_into_one_write() {
    let (store, driver) = test_store("coalesce-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "k");

    record.mutate(|p| { p.map_mut().insert("v".to_string(), 1i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    record.mutate(|p| { p.map_mut().insert("v".to_string(), 2i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    record.mutate(|p| { p.map_mut().insert("v".to_string(), 3i64.into()); }).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let stats = driver.stats();
    assert_eq!(stats.primary_puts, 1);
    assert_eq!(stats.secondary_puts, 1);
    assert!(!driver.is_locked(category.internal_index(), "k"));

    let loaded = record.load().await.unwrap();
    assert_eq!(loaded.tree().as_map().unwrap().get("v"), Some(&3i64.into()));
}

#[tokio::test(start_paused = true)]
async fn a_mutation_arriving_during_secondary_write_follows_up_with_its_own_pair() {
    let (store, driver) = test_store("followup-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "k");
    let index = category.internal_index();

    // Hold the first save's secondary write open so it is still in flight
    // (lease held, `in_work` already cleared) when the second mutation
    // arrives, forcing it onto the followup path instead of a fresh save.
    driver.hold_next_secondary_write();

    record.mutate(|p| { p.map_mut().insert("v".to_string(), 1i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;

    let stats = driver.stats();
    assert_eq!(stats.primary_puts, 1, "primary write completes before the gated secondary write");
    assert_eq!(stats.secondary_puts, 0, "secondary write is held open by the gate");
    assert!(driver.is_locked(index, "k"), "lease stays held while the secondary write is in flight");

    record.mutate(|p| { p.map_mut().insert("v".to_string(), 2i64.into()); }).await.unwrap();

    // The second mutation attached as a followup rather than taking a
    // fresh lease or starting its own save task.
    assert_eq!(driver.stats().secondary_puts, 0);
    assert!(driver.is_locked(index, "k"));

    driver.release_secondary_write();
    tokio::time::sleep(Duration::from_millis(1)).await;

    // First pair's secondary write has now completed, but the lease must
    // still be held for the followup's own pair rather than released and
    // reacquired.
    let stats = driver.stats();
    assert_eq!(stats.primary_puts, 1);
    assert_eq!(stats.secondary_puts, 1);
    assert!(driver.is_locked(index, "k"), "lease is inherited by the followup, never released in between");

    tokio::time::sleep(Duration::from_secs(6)).await;

    let stats = driver.stats();
    assert_eq!(stats.primary_puts, 2);
    assert_eq!(stats.secondary_puts, 2);
    assert!(!driver.is_locked(index, "k"));
}

#[tokio::test(start_paused = true)]
async fn remove_during_the_coalescing_window_skips_the_write() {
    let (store, driver) = test_store("remove-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "k");

    record.mutate(|p| { p.map_mut().insert("v".to_string(), 1i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    record.remove().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(driver.stats().secondary_puts, 0);
    assert_eq!(driver.get(category.internal_index(), "k").await.unwrap(), None);
    assert!(!driver.is_locked(category.internal_index(), "k"));
}

#[tokio::test(start_paused = true)]
async fn mutating_a_removed_record_is_a_no_op_against_the_driver() {
    let (store, driver) = test_store("mutate-after-remove-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "k");

    record.mutate(|p| { p.map_mut().insert("v".to_string(), 1i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(driver.stats().primary_puts, 1);

    record.remove().await.unwrap();
    // Reuse the same `Record` handle (and hence the same, now-removed
    // Holder) to stand in for a caller racing a mutation in against the
    // just-removed key before noticing the removal.
    record.mutate(|p| { p.map_mut().insert("v".to_string(), 2i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(driver.stats().primary_puts, 1, "no further primary write after remove");
    assert_eq!(driver.get(category.internal_index(), "k").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn enumeration_surfaces_a_record_not_yet_persisted() {
    let (store, driver) = test_store("enumeration-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "new");

    record.mutate(|p| { p.map_mut().insert("x".to_string(), 1i64.into()); }).await.unwrap();

    let keys = store
        .list_keys(&category, &storedmap::ListFilter::default())
        .await
        .unwrap();
    assert!(keys.contains(&"new".to_string()));
    assert_eq!(driver.stats().primary_puts, 0);
}

#[tokio::test(start_paused = true)]
async fn numeric_sort_values_round_trip_through_the_persisted_record() {
    let (store, _driver) = test_store("sort-scenario").await;
    let category = store.category("articles").await.unwrap();
    let record = store.record(&category, "k");

    record.set_sort(SortValue::Number(42.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let loaded = record.load().await.unwrap();
    assert_eq!(loaded.sort(), &SortValue::Number(42.0));
}

use std::time::Duration;

use storedmap_test_support::test_store;

#[tokio::test(start_paused = true)]
async fn category_names_recovers_registered_categories_including_translated_ones() {
    let (store, _driver) = test_store("category-names-scenario").await;

    let articles = store.category("articles").await.unwrap();
    // Long enough, and non-basic-Latin, to force the directory/UUID path.
    let fishing = store.category("Статьи о рыбалке и отдыхе на природе").await.unwrap();

    // A category's own index only shows up in driver enumeration once
    // something has actually been written to it.
    store.record(&articles, "k").mutate(|p| { p.map_mut().insert("x".to_string(), 1i64.into()); }).await.unwrap();
    store.record(&fishing, "k").mutate(|p| { p.map_mut().insert("x".to_string(), 1i64.into()); }).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let mut names = store.category_names().await.unwrap();
    names.sort();

    let mut expected = vec!["articles".to_string(), "Статьи о рыбалке и отдыхе на природе".to_string()];
    expected.sort();

    assert_eq!(names, expected);
}

#[tokio::test]
async fn category_names_is_empty_for_a_fresh_store() {
    let (store, _driver) = test_store("category-names-empty-scenario").await;
    assert!(store.category_names().await.unwrap().is_empty());
}

use std::time::{Duration, SystemTime};

use storyapps_core::cache::{CacheStorage, ExpirationPolicy};
use storyapps_core::models::HttpResponse;

const IMAGES: &str = "db-StoryApps-v1-images-cache";

fn image_url(index: usize) -> String {
    format!("https://story-api.dicoding.dev/images/stories/photo-{index}.jpg")
}

#[test]
fn entry_bound_evicts_oldest_added_first() {
    let storage = CacheStorage::new();
    let policy = ExpirationPolicy::new(60, Duration::from_secs(30 * 24 * 60 * 60));
    let now = SystemTime::now();

    for index in 0..61 {
        storage.put_at(IMAGES, &image_url(index), HttpResponse::new(200, "jpeg"), now);
    }
    let evicted = storage.enforce(IMAGES, &policy, now);

    assert_eq!(evicted, vec![image_url(0)]);
    assert_eq!(storage.entry_count(IMAGES), 60);
    assert_eq!(storage.urls(IMAGES).first(), Some(&image_url(1)));
    assert_eq!(storage.urls(IMAGES).last(), Some(&image_url(60)));
}

#[test]
fn re_storing_a_url_makes_it_the_newest_entry() {
    let storage = CacheStorage::new();
    let policy = ExpirationPolicy {
        max_entries: Some(2),
        max_age: None,
    };

    storage.put(IMAGES, &image_url(1), HttpResponse::new(200, "one"));
    storage.put(IMAGES, &image_url(2), HttpResponse::new(200, "two"));
    storage.put(IMAGES, &image_url(1), HttpResponse::new(200, "one again"));
    storage.put(IMAGES, &image_url(3), HttpResponse::new(200, "three"));

    assert_eq!(storage.enforce(IMAGES, &policy, SystemTime::now()), vec![image_url(2)]);
    assert_eq!(
        storage.lookup(IMAGES, &image_url(1)),
        Some(HttpResponse::new(200, "one again"))
    );
}

#[test]
fn entries_past_max_age_are_removed() {
    let storage = CacheStorage::new();
    let api = "db-StoryApps-v1-api-cache";
    let url = "https://story-api.dicoding.dev/v1/stories?page=1&size=10&location=1";
    let policy = ExpirationPolicy::new(100, Duration::from_secs(5 * 60));
    let now = SystemTime::now();

    storage.put_at(api, url, HttpResponse::new(200, "[]"), now - Duration::from_secs(6 * 60));
    storage.put_at(api, "https://story-api.dicoding.dev/v1/stories/s1", HttpResponse::new(200, "{}"), now);

    assert_eq!(storage.lookup_fresh(api, url, &policy, now), None);
    assert_eq!(storage.lookup(api, url), None);
    assert_eq!(storage.entry_count(api), 1);

    let later = now + Duration::from_secs(10 * 60);
    assert_eq!(storage.enforce(api, &policy, later).len(), 1);
    assert_eq!(storage.entry_count(api), 0);
}

#[test]
fn deleting_a_cache_removes_it_from_keys() {
    let storage = CacheStorage::new();
    storage.open("db-StoryApps-v1-pages-cache");
    storage.open("workbox-runtime");

    assert!(storage.has("workbox-runtime"));
    assert!(storage.delete("db-StoryApps-v1-pages-cache"));
    assert!(!storage.delete("db-StoryApps-v1-pages-cache"));
    assert_eq!(storage.keys(), vec!["workbox-runtime".to_string()]);
}

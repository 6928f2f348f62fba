//! Tests for the message store.

use super::*;

fn envelope(body: &str) -> MessageEnvelope {
    MessageEnvelope::from_string(None, "Test", body)
}

#[test]
fn test_store_is_fifo() {
    let mut store = MessageStore::new();
    store.push_back(envelope("first"));
    store.push_back(envelope("second"));

    assert_eq!(store.len(), 2);
    assert_eq!(store.pop_front().unwrap().message_as_string().unwrap(), "first");
    assert_eq!(store.pop_front().unwrap().message_as_string().unwrap(), "second");
    assert!(store.pop_front().is_none());
    assert_eq!(store.len(), 0);
}

#[test]
fn test_front_does_not_remove() {
    let mut store = MessageStore::new();
    store.push_back(envelope("only"));

    assert!(store.front().is_some());
    assert!(store.front().is_some());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_head_returns_leading_entries_in_order() {
    let mut store = MessageStore::new();
    for body in ["a", "b", "c"] {
        store.push_back(envelope(body));
    }

    let head: Vec<String> = store
        .head(2)
        .iter()
        .map(|e| e.message_as_string().unwrap())
        .collect();
    assert_eq!(head, vec!["a", "b"]);
    assert_eq!(store.head(10).len(), 3);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_head_of_empty_store_is_empty() {
    let store = MessageStore::new();
    assert!(store.head(5).is_empty());
}

#[test]
fn test_clear_empties_store() {
    let mut store = MessageStore::new();
    store.push_back(envelope("a"));
    store.push_back(envelope("b"));

    store.clear();
    assert_eq!(store.len(), 0);
}

#[test]
fn test_push_front_goes_ahead_of_waiting_entries() {
    let mut store = MessageStore::new();
    store.push_back(envelope("second"));
    store.push_front(envelope("first"));

    assert_eq!(store.pop_front().unwrap().message_as_string().unwrap(), "first");
    assert_eq!(store.pop_front().unwrap().message_as_string().unwrap(), "second");
}

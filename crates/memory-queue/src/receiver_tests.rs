//! Tests for the message receivers.

use super::*;
use crate::message::QueueName;
use crate::providers::MemoryMessageQueue;
use std::sync::Arc;

fn queue() -> MemoryMessageQueue {
    MemoryMessageQueue::new(QueueName::new("receiver-queue".to_string()).unwrap())
}

#[tokio::test]
async fn test_callback_receiver_invokes_callback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let receiver = CallbackMessageReceiver::new(move |envelope: &MessageEnvelope| {
        sink.lock().unwrap().push(envelope.message_type().to_string());
        Ok(())
    });

    let mut envelope = MessageEnvelope::from_string(None, "Greeting", "hi");
    receiver
        .receive_message(&mut envelope, &queue())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["Greeting".to_string()]);
}

#[tokio::test]
async fn test_callback_receiver_propagates_error() {
    let receiver = CallbackMessageReceiver::new(|_envelope: &MessageEnvelope| {
        Err(anyhow::anyhow!("rejected"))
    });

    let mut envelope = MessageEnvelope::from_string(None, "Greeting", "hi");
    let result = receiver.receive_message(&mut envelope, &queue()).await;
    assert_eq!(result.unwrap_err().to_string(), "rejected");
}

#[tokio::test]
async fn test_test_receiver_records_and_clears() {
    let receiver = TestMessageReceiver::new();
    let queue = queue();

    for text in ["one", "two"] {
        let mut envelope = MessageEnvelope::from_string(None, "Test", text);
        receiver.receive_message(&mut envelope, &queue).await.unwrap();
    }

    assert_eq!(receiver.message_count(), 2);
    assert_eq!(receiver.messages()[1].message_as_string().unwrap(), "two");

    receiver.clear();
    assert_eq!(receiver.message_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_messages_times_out() {
    let receiver = TestMessageReceiver::new();
    assert!(!receiver.wait_for_messages(1, Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_wait_for_messages_wakes_on_arrival() {
    let receiver = Arc::new(TestMessageReceiver::new());
    let producer = receiver.clone();

    tokio::spawn(async move {
        let mut envelope = MessageEnvelope::from_string(None, "Test", "late");
        producer
            .receive_message(&mut envelope, &queue())
            .await
            .unwrap();
    });

    assert!(receiver.wait_for_messages(1, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_wait_for_messages_accepts_unbounded_timeout() {
    let receiver = TestMessageReceiver::new();
    let mut envelope = MessageEnvelope::from_string(None, "Test", "early");
    receiver
        .receive_message(&mut envelope, &queue())
        .await
        .unwrap();

    assert!(receiver.wait_for_messages(1, Duration::MAX).await);
}

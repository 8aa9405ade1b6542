use rusty_bridge_core::ReplayChannel;

#[test]
fn new_subscriber_sees_the_latest_value_first() {
    let channel = ReplayChannel::new(0u64);
    channel.publish(1);
    channel.publish(2);

    let mut sub = channel.subscribe();
    assert_eq!(sub.try_next(), Some(2));
    assert_eq!(sub.try_next(), None);
    assert_eq!(channel.latest(), 2);
}

#[test]
fn subscribers_receive_later_values_in_order() {
    let channel = ReplayChannel::new(None::<u64>);
    let mut sub = channel.subscribe();
    channel.publish(Some(56));
    channel.publish(None);

    assert_eq!(sub.try_next(), Some(None));
    assert_eq!(sub.try_next(), Some(Some(56)));
    assert_eq!(sub.try_next(), Some(None));
    assert_eq!(sub.try_next(), None);
}

#[tokio::test]
async fn next_waits_for_a_publish() {
    let channel = std::sync::Arc::new(ReplayChannel::new(String::from("idle")));
    let mut sub = channel.subscribe();
    assert_eq!(sub.next().await.as_deref(), Some("idle"));

    let publisher = std::sync::Arc::clone(&channel);
    tokio::spawn(async move {
        publisher.publish("connected".to_owned());
    });
    assert_eq!(sub.next().await.as_deref(), Some("connected"));
}

#[tokio::test]
async fn next_ends_when_the_channel_is_dropped() {
    let channel = ReplayChannel::new(1u8);
    let mut sub = channel.subscribe();
    drop(channel);
    assert_eq!(sub.next().await, Some(1));
    assert_eq!(sub.next().await, None);
}

mod common;

use folio::{Error, LineWrapper};
use tokio::sync::mpsc;

#[tokio::test]
async fn unbounded_subscription_streams_all_lines() {
    let (wrapper, run) = LineWrapper::new(5, b"\n".to_vec()).unwrap();
    let (block_tx, block_rx) = mpsc::channel(4);
    let task = tokio::spawn(run.run(block_rx, None));

    block_tx.send(common::block(0, b"abcdefgh")).await.unwrap();
    block_tx.send(common::block(1, b"i\n1234567")).await.unwrap();
    drop(block_tx);

    let (sink, mut lines) = mpsc::channel(10);
    let id = wrapper.subscribe_lines(0, None, sink).await.unwrap();

    let mut got = Vec::new();
    for _ in 0..4 {
        got.push(lines.recv().await.expect("line"));
    }
    assert_eq!(
        got.iter().map(|l| l.number).collect::<Vec<_>>(),
        vec![0, 1, 2, 3],
        "numbers are dense and ascending"
    );
    assert!(got[0].loc.start.block == 0 && got[0].loc.end.block == 0);
    // "fghi\n" straddles the block boundary.
    assert_eq!(got[1].loc.start.block, 0);
    assert_eq!(got[1].loc.end.block, 1);
    assert!(got[1].ends_with_separator);
    assert!(!got[3].ends_with_separator);

    wrapper.cancel_subscription(id).await.unwrap();
    assert!(lines.recv().await.is_none(), "cancel closes the sink");
    assert!(matches!(
        wrapper.cancel_subscription(id).await,
        Err(Error::SubscriptionUnknown(_))
    ));

    assert_eq!(wrapper.line_count().await.unwrap(), 4);
    wrapper.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn bounded_subscription_replays_only_its_window() {
    let (wrapper, run) = LineWrapper::new(5, b"\n".to_vec()).unwrap();
    let (block_tx, block_rx) = mpsc::channel(4);
    let task = tokio::spawn(run.run(block_rx, None));

    block_tx.send(common::block(0, b"a\nb\nc\nd\n")).await.unwrap();
    drop(block_tx);

    // Wait until everything is materialized, then subscribe mid-range.
    while wrapper.line_count().await.unwrap() < 4 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let (sink, mut lines) = mpsc::channel(10);
    wrapper.subscribe_lines(1, Some(2), sink).await.unwrap();
    assert_eq!(lines.recv().await.unwrap().number, 1);
    assert_eq!(lines.recv().await.unwrap().number, 2);

    assert!(matches!(
        wrapper.subscribe_lines(3, Some(1), mpsc::channel(1).0).await,
        Err(Error::InvalidRange(_))
    ));

    wrapper.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn block_to_line_mapping_covers_straddling_lines() {
    let (wrapper, run) = LineWrapper::new(5, b"\n".to_vec()).unwrap();
    let (block_tx, block_rx) = mpsc::channel(4);
    let task = tokio::spawn(run.run(block_rx, None));

    block_tx.send(common::block(0, b"abcdefgh")).await.unwrap();
    block_tx.send(common::block(1, b"i\n1234567")).await.unwrap();
    drop(block_tx);
    while wrapper.line_count().await.unwrap() < 4 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let in0: Vec<u32> = wrapper.lines_in_block(0).await.unwrap().iter().map(|l| l.number).collect();
    assert_eq!(in0, vec![0, 1], "line 1 starts in block 0");
    let in1: Vec<u32> = wrapper.lines_in_block(1).await.unwrap().iter().map(|l| l.number).collect();
    assert_eq!(in1, vec![1, 2, 3], "line 1 ends in block 1");
    assert!(wrapper.lines_in_block(7).await.unwrap().is_empty());

    wrapper.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn wrap_events_report_the_running_total() {
    let (wrapper, run) = LineWrapper::new(5, b"\n".to_vec()).unwrap();
    let (block_tx, block_rx) = mpsc::channel(4);
    let (wrap_tx, mut wrap_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run.run(block_rx, Some(wrap_tx)));

    block_tx.send(common::block(0, b"a\nb\nc\n")).await.unwrap();
    drop(block_tx);

    let mut totals = Vec::new();
    for _ in 0..3 {
        totals.push(wrap_rx.recv().await.expect("wrap event").total_lines);
    }
    assert_eq!(totals, vec![1, 2, 3]);

    wrapper.stop().await;
    // Shutdown closes the observer channel.
    assert!(wrap_rx.recv().await.is_none());
    task.await.unwrap();
}

#[tokio::test]
async fn bad_wrapper_configuration_is_rejected() {
    assert!(matches!(
        LineWrapper::new(0, b"\n".to_vec()),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(LineWrapper::new(5, Vec::new()), Err(Error::InvalidConfiguration(_))));
}

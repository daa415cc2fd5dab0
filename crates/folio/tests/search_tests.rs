mod common;

use folio::{Error, Event, LineOffset, LineOffsetRange};

fn lor(al: u32, ao: u32, bl: u32, bo: u32) -> LineOffsetRange {
    LineOffsetRange {
        from: LineOffset { line: al, offset: ao },
        to: LineOffset { line: bl, offset: bo },
    }
}

#[tokio::test]
async fn finds_a_match_inside_one_line() {
    let (mut driver, mut events) = common::driver_for(b"Diane\nGeorge\nMadison\nWilliam\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    driver.watch_lines(0, 10).await.unwrap();
    let got = common::collect_lines(&mut events, 4).await;
    assert_eq!(got, ["Diane\n", "George\n", "Madison\n", "William\n"]);

    driver.search("orge").await.unwrap();
    let status = common::wait_search_complete(&mut events).await;
    assert_eq!(status.query, "orge");
    assert_eq!(status.results, vec![lor(1, 2, 1, 5)]);

    driver.stop().await;
}

#[tokio::test]
async fn search_reports_progress_then_completion() {
    let (mut driver, mut events) = common::driver_for(b"hello world\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    common::wait_total_lines(&driver, 1).await;

    driver.search("world").await.unwrap();
    let mut saw_in_progress = false;
    loop {
        match events.recv().await.expect("event") {
            Event::Search(status) if !status.complete => {
                assert!(status.results.is_empty());
                saw_in_progress = true;
            }
            Event::Search(status) => {
                assert!(saw_in_progress, "in-progress status precedes completion");
                assert_eq!(status.results, vec![lor(0, 6, 0, 10)]);
                break;
            }
            _ => {}
        }
    }
    driver.stop().await;
}

#[tokio::test]
async fn finds_a_match_spanning_wrapped_lines() {
    let (mut driver, mut events) = common::driver_for(b"abcdefg\nxyz\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(5).await.unwrap();
    common::wait_total_lines(&driver, 3).await;

    // "defg" starts on the wrapped line "abcde" and ends on "fg\n".
    driver.search("defg").await.unwrap();
    let status = common::wait_search_complete(&mut events).await;
    assert_eq!(status.results, vec![lor(0, 3, 1, 1)]);
    driver.stop().await;
}

#[tokio::test]
async fn block_straddling_match_is_reported_once() {
    // "yz\nq" crosses the 5-byte block boundary, so both the block that
    // starts it and the next one are index candidates.
    let (mut driver, mut events) = common::driver_for(b"abcdxyz\nqqq\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    common::wait_total_lines(&driver, 2).await;

    driver.search("yz\nq").await.unwrap();
    let status = common::wait_search_complete(&mut events).await;
    assert_eq!(status.results, vec![lor(0, 5, 1, 0)]);
    driver.stop().await;
}

#[tokio::test]
async fn repeated_matches_are_all_reported_in_order() {
    let (mut driver, mut events) = common::driver_for(b"one fish two fish\nred fish\n", 6, 5);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    common::wait_total_lines(&driver, 2).await;

    driver.search("fish").await.unwrap();
    let status = common::wait_search_complete(&mut events).await;
    assert_eq!(status.results, vec![lor(0, 4, 0, 7), lor(0, 13, 0, 16), lor(1, 4, 1, 7)]);
    driver.stop().await;
}

#[tokio::test]
async fn no_match_completes_with_empty_results() {
    let (mut driver, mut events) = common::driver_for(b"Diane\nGeorge\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    common::wait_total_lines(&driver, 2).await;

    driver.search("zzz").await.unwrap();
    let status = common::wait_search_complete(&mut events).await;
    assert!(status.complete);
    assert!(status.results.is_empty());
    driver.stop().await;
}

#[tokio::test]
async fn short_queries_are_rejected() {
    let (mut driver, _events) = common::driver_for(b"Diane\nGeorge\n", 5, 4);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    assert!(matches!(
        driver.search("ab").await,
        Err(Error::QueryTooShort { length: 2, min: 3 })
    ));
    assert!(matches!(driver.search("").await, Err(Error::QueryTooShort { .. })));
    driver.stop().await;
}

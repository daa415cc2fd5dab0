mod common;

use folio::test_helpers::pipe;
use folio::{BlockReader, Driver, Error, ReaderConfig};

#[tokio::test]
async fn watch_resize_watch() {
    let (mut driver, mut events) = common::driver_for(b"abcdefg\n1\n2\n3\n4\n5", 5, 4);
    driver.run().unwrap();
    driver.resize_window(5).await.unwrap();

    driver.watch_lines(0, 5).await.unwrap();
    let got = common::collect_lines(&mut events, 5).await;
    assert_eq!(got, ["abcde", "fg\n", "1\n", "2\n", "3\n"]);

    driver.watch_lines(1, 5).await.unwrap();
    let got = common::collect_lines(&mut events, 5).await;
    assert_eq!(got, ["fg\n", "1\n", "2\n", "3\n", "4\n"]);
    common::assert_no_events(&mut events).await;

    driver.resize_window(10).await.unwrap();
    driver.watch_lines(0, 2).await.unwrap();
    let got = common::collect_lines(&mut events, 2).await;
    assert_eq!(got, ["abcdefg\n", "1\n"]);

    driver.stop().await;
    assert!(events.recv().await.is_none(), "stop closes the event stream");
}

#[tokio::test]
async fn resize_to_the_same_width_is_a_no_op() {
    let (mut driver, mut events) = common::driver_for(b"a\nb\nc\n", 5, 2);
    driver.run().unwrap();
    driver.resize_window(10).await.unwrap();
    common::wait_total_lines(&driver, 3).await;

    // Same width again: the session survives, nothing re-emits.
    driver.resize_window(10).await.unwrap();
    assert_eq!(driver.total_lines(), 3);
    common::assert_no_events(&mut events).await;

    driver.watch_lines(0, 3).await.unwrap();
    let got = common::collect_lines(&mut events, 3).await;
    assert_eq!(got, ["a\n", "b\n", "c\n"]);
    driver.stop().await;
}

#[tokio::test]
async fn streaming_pipe_resize_midway() {
    let (writer, source) = pipe();
    let config = ReaderConfig::new(Box::new(source), 5, 1);
    let (reader, run) = BlockReader::new(config).unwrap();
    let (mut driver, mut events) = Driver::new(reader, run, b"\n".to_vec()).unwrap();
    driver.run().unwrap();
    driver.resize_window(5).await.unwrap();
    common::assert_no_events(&mut events).await;

    // Splits into block "abcde" plus a partial tail that yields no line
    // until the pipe closes.
    writer.write(b"abcdefg\n");
    driver.watch_lines(0, 2).await.unwrap();
    let got = common::collect_lines(&mut events, 1).await;
    assert_eq!(got, ["abcde"]);
    common::assert_no_events(&mut events).await;

    // Rewrap what has been read at width 2.
    driver.resize_window(2).await.unwrap();
    driver.watch_lines(0, 3).await.unwrap();
    let got = common::collect_lines(&mut events, 2).await;
    assert_eq!(got, ["ab", "cd"]);
    common::assert_no_events(&mut events).await;

    // Closing the pipe flushes the rest.
    writer.close();
    driver.watch_lines(0, 10).await.unwrap();
    let got = common::collect_lines(&mut events, 4).await;
    assert_eq!(got, ["ab", "cd", "ef", "g\n"]);

    driver.stop().await;
}

#[tokio::test]
async fn viewport_shifts_by_one_line() {
    // 50 fixed-width raw lines; the adapter convention keeps one terminal
    // row for the status line, so a 25-row screen watches 24 lines.
    let input: String = (0..50).map(|i| format!("{:03}: aaaa\n", i)).collect();
    let (mut driver, mut events) = common::driver_for(input.as_bytes(), 10, 2);
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();

    driver.watch_lines(0, 24).await.unwrap();
    let got = common::collect_numbered(&mut events, 24).await;
    assert_eq!(got.first().unwrap(), &(0, "000: aaaa\n".to_string()));
    assert_eq!(got.last().unwrap(), &(23, "023: aaaa\n".to_string()));
    assert_eq!(got.len(), 24);
    common::assert_no_events(&mut events).await;

    driver.watch_lines(1, 24).await.unwrap();
    let got = common::collect_numbered(&mut events, 24).await;
    assert_eq!(got.first().unwrap(), &(1, "001: aaaa\n".to_string()));
    assert_eq!(got.last().unwrap(), &(24, "024: aaaa\n".to_string()));

    driver.stop().await;
}

#[tokio::test]
async fn total_lines_follows_the_wrap() {
    let (mut driver, _events) = common::driver_for(b"abcdefg\n1\n2\n3\n4\n5", 5, 4);
    driver.run().unwrap();
    assert_eq!(driver.total_lines(), 0);
    driver.resize_window(5).await.unwrap();
    common::wait_total_lines(&driver, 7).await;
    // A narrower width re-wraps into more lines.
    driver.resize_window(2).await.unwrap();
    common::wait_total_lines(&driver, 9).await;
    driver.stop().await;
}

#[tokio::test]
async fn file_driver_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.txt");
    std::fs::write(&path, b"alpha\nbeta\ngamma\n").unwrap();

    let (mut driver, mut events) = folio::file_driver(&path, 1024, 9, b"\n".to_vec()).unwrap();
    driver.run().unwrap();
    driver.resize_window(80).await.unwrap();
    driver.watch_lines(0, 3).await.unwrap();
    let got = common::collect_lines(&mut events, 3).await;
    assert_eq!(got, ["alpha\n", "beta\n", "gamma\n"]);
    driver.stop().await;
}

#[tokio::test]
async fn operations_require_their_prerequisites() {
    let (mut driver, _events) = common::driver_for(b"abc\n", 5, 2);
    assert!(matches!(
        driver.resize_window(5).await,
        Err(Error::PreconditionViolated(_))
    ));
    driver.run().unwrap();
    assert!(matches!(
        driver.watch_lines(0, 5).await,
        Err(Error::PreconditionViolated(_))
    ));
    assert!(matches!(driver.search("abc").await, Err(Error::PreconditionViolated(_))));
    assert!(matches!(driver.resize_window(0).await, Err(Error::InvalidConfiguration(_))));

    driver.resize_window(5).await.unwrap();
    assert!(matches!(driver.watch_lines(0, 0).await, Err(Error::InvalidRange(_))));
    driver.stop().await;
}

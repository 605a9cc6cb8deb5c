//! Window partitioning and the work arena

use crate::support::date;
use slicehound::engine::{WindowArena, WindowPartitioner, WindowStatus};
use slicehound::{SearchKind, SearchWindow};

#[test]
fn test_leaves_are_deterministic() {
    let window = SearchWindow::years(2015, 2024).unwrap();
    let dense = |w: &SearchWindow| w.days() > 45;
    let first = WindowPartitioner::leaves(window, dense);
    let second = WindowPartitioner::leaves(window, dense);
    assert_eq!(first, second);
    assert!(first.len() > 64);
}

#[test]
fn test_leaves_stop_at_single_days() {
    let window = SearchWindow::new(date(2020, 2, 1), date(2020, 2, 29)).unwrap();
    let leaves = WindowPartitioner::leaves(window, |_| true);
    assert_eq!(leaves.len(), 29);
    assert!(leaves.iter().all(SearchWindow::is_single_day));
    assert_eq!(leaves[28], SearchWindow::day(date(2020, 2, 29)));
}

#[test]
fn test_split_of_odd_length_window_favours_left() {
    let window = SearchWindow::new(date(2021, 1, 1), date(2021, 1, 3)).unwrap();
    let (left, right) = WindowPartitioner::split(window).unwrap();
    assert_eq!(left, SearchWindow::new(date(2021, 1, 1), date(2021, 1, 2)).unwrap());
    assert_eq!(right, SearchWindow::day(date(2021, 1, 3)));
}

#[test]
fn test_split_depth_is_logarithmic() {
    // Ten years reach single days in at most ceil(log2(3653)) = 12 splits.
    let mut arena = WindowArena::new();
    arena.push_root(SearchWindow::years(2015, 2024).unwrap(), SearchKind::Repository);
    let mut max_depth = 0;
    while let Some(id) = arena.pop() {
        if arena.split(id).is_none() {
            max_depth = max_depth.max(arena.node(id).depth);
            arena.retire(id, WindowStatus::Complete);
        }
    }
    assert!(max_depth <= 12, "depth {max_depth}");
    let days: i64 = arena
        .nodes()
        .iter()
        .filter(|node| node.status == WindowStatus::Complete)
        .map(|node| node.window.days())
        .sum();
    assert_eq!(days, SearchWindow::years(2015, 2024).unwrap().days());
}

#[test]
fn test_queue_is_breadth_first() {
    let mut arena = WindowArena::new();
    let root = arena.push_root(
        SearchWindow::new(date(2022, 1, 1), date(2022, 1, 8)).unwrap(),
        SearchKind::Code,
    );
    arena.pop();
    let (left, right) = arena.split(root).unwrap();
    arena.pop();
    let (left_left, _) = arena.split(left).unwrap();

    let order: Vec<_> = arena.queued().map(|node| node.window).collect();
    assert_eq!(order[0], arena.node(right).window);
    assert_eq!(order[1], arena.node(left_left).window);
}

#[test]
fn test_retry_now_jumps_queue_without_attempt() {
    let mut arena = WindowArena::new();
    let first = arena.push_root(SearchWindow::day(date(2020, 1, 1)), SearchKind::Repository);
    let second = arena.push_root(SearchWindow::day(date(2020, 1, 1)), SearchKind::Gist);

    assert_eq!(arena.pop(), Some(first));
    arena.retry_now(first);
    assert_eq!(arena.node(first).attempts, 0);
    assert_eq!(arena.pop(), Some(first));
    assert_eq!(arena.pop(), Some(second));
    assert_eq!(arena.pop(), None);
}

#[test]
fn test_failed_status_keeps_reason() {
    let mut arena = WindowArena::new();
    let id = arena.push_root(SearchWindow::day(date(2020, 1, 1)), SearchKind::Repository);
    arena.pop();
    arena.retire(id, WindowStatus::Failed("query rejected".to_string()));
    assert_eq!(
        arena.node(id).status,
        WindowStatus::Failed("query rejected".to_string())
    );
    assert_eq!(arena.pending(), 0);
    assert!(arena.queued().next().is_none());
}

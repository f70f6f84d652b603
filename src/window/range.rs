//! Window arithmetic over an ordered candidate list

/// Half-open `[start, end)` range of candidates to monitor.
///
/// A list no longer than `capacity` is shown whole. Otherwise `start` is
/// clamped so the window always holds exactly `capacity` items.
pub fn compute_range(total: usize, capacity: usize, start: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= capacity {
        return (0, total);
    }

    let start = start.min(total - capacity);
    (start, start + capacity)
}

/// Start of the window after `start`, pinned to the tail
pub fn next_start(total: usize, capacity: usize, start: usize) -> usize {
    if total <= capacity {
        return 0;
    }

    let next = start + capacity;
    if next + capacity > total {
        total - capacity
    } else {
        next
    }
}

/// Start of the window before `start`, pinned to the head
pub fn prev_start(total: usize, capacity: usize, start: usize) -> usize {
    if total <= capacity {
        return 0;
    }
    start.saturating_sub(capacity).min(total - capacity)
}

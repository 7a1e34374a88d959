use std::sync::atomic::{AtomicUsize, Ordering};

/// 当前轮询周期内已完成的设备读取计数。
///
/// 计数达到设备总数时归零，递增与归零在同一次原子读改写中完成，
/// 因此每个周期恰好有一个调用者观察到完成。
#[derive(Debug)]
pub struct SweepCounter {
    count: AtomicUsize,
    len: usize,
}

impl SweepCounter {
    pub fn new(len: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            len,
        }
    }

    /// 记录一次完成的读取；返回 `true` 表示本次读取结束了一个周期。
    pub fn record(&self) -> bool {
        if self.len == 0 {
            return false;
        }
        let len = self.len;
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(if n + 1 >= len { 0 } else { n + 1 })
            })
            .unwrap_or_default();
        previous + 1 >= len
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

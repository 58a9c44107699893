use std::fmt;

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub num_workers: usize,
    pub running_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.num_workers == 0 {
            return 0.0;
        }
        self.running_tasks as f64 / self.num_workers as f64
    }

    pub fn finished(&self) -> usize {
        self.completed_tasks + self.failed_tasks
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.finished();
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}


/// Стратегия доставки результатов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Поток в порядке batch
    Ordered,
    /// Поток в порядке завершения
    Unordered,
    /// Handle на каждую задачу
    Futures,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Ordered => "ordered",
            Strategy::Unordered => "unordered",
            Strategy::Futures => "futures",
        };
        f.write_str(name)
    }
}

use chronofetch_io::RunLog;

/// Completion counter that logs at every tenth of the total and at the end.
#[derive(Debug)]
pub struct Progress {
    label: String,
    total: usize,
    done: usize,
    last_decile: usize,
}

impl Progress {
    pub fn new(label: impl Into<String>, total: usize) -> Self {
        Self {
            label: label.into(),
            total,
            done: 0,
            last_decile: 0,
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record one finished sub-query. Returns true when a line was logged.
    pub fn tick(&mut self, log: &RunLog) -> bool {
        self.done += 1;
        if self.total == 0 {
            return false;
        }
        let decile = self.done * 10 / self.total;
        if decile > self.last_decile || self.done == self.total {
            self.last_decile = decile;
            log.info(format!(
                "{}: {}/{} sub-queries finished ({}%)",
                self.label,
                self.done,
                self.total,
                self.done * 100 / self.total
            ));
            return true;
        }
        false
    }
}

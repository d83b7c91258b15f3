use libc::pid_t;

/// Hands out background job ids: 1, 2, 3, ... for the life of the shell.
/// Ids are never reused and nothing is looked up by id afterwards.
#[derive(Debug)]
pub(crate) struct JobCounter {
    next: u32,
}

impl JobCounter {
    pub(crate) fn new() -> Self {
        JobCounter { next: 1 }
    }

    /// The id the next launch will receive.
    pub(crate) fn peek(&self) -> u32 {
        self.next
    }

    pub(crate) fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// What a finished background launch leaves behind.
#[derive(Debug)]
pub(crate) struct BackgroundJob {
    pub id: u32,
    pub pid: pid_t,
    pub output: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::JobCounter;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut jobs = JobCounter::new();
        assert_eq!(jobs.peek(), 1);
        assert_eq!(jobs.next_id(), 1);
        assert_eq!(jobs.next_id(), 2);
        assert_eq!(jobs.peek(), 3);
        assert_eq!(jobs.next_id(), 3);
    }
}

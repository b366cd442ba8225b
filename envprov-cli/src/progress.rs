// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, WeakProgressBar};

#[derive(Clone)]
pub(crate) struct SuspendableBars {
    bars: Arc<Mutex<Vec<WeakProgressBar>>>,
}

impl SuspendableBars {
    pub(crate) fn new() -> SuspendableBars {
        SuspendableBars {
            bars: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_bar(&self, bar: ProgressBar) -> ProgressBar {
        self.bars.lock().unwrap().push(bar.downgrade());
        bar
    }

    /// Runs `callback` with the one unfinished bar, if any, cleared from the
    /// terminal.
    pub(crate) fn suspended(&self, callback: impl FnOnce()) {
        let active = {
            let mut bs = self.bars.lock().unwrap();
            bs.retain(|b| b.upgrade().is_some());
            bs.iter()
                .filter_map(WeakProgressBar::upgrade)
                .find(|bar| !bar.is_finished())
        };

        match active {
            Some(bar) => bar.suspend(callback),
            None => (callback)(),
        }
    }
}

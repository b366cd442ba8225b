// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::cell::RefCell;
use std::rc::Rc;

type StartFn<'p> = Box<dyn FnMut(&str, u64) + 'p>;
type UpdateFn<'p> = Box<dyn FnMut(&str, u64) + 'p>;
type FinishFn<'p> = Box<dyn FnMut(&str) + 'p>;

#[derive(Default)]
struct ProgressInternal<'p> {
    start: Option<StartFn<'p>>,
    update: Option<UpdateFn<'p>>,
    finish: Option<FinishFn<'p>>,
}

impl<'p> ProgressInternal<'p> {
    fn start(&mut self, id: &str, len: u64) {
        if let Some(cb) = &mut self.start {
            (cb)(id, len);
        }
    }

    fn update(&mut self, id: &str, delta: u64) {
        if let Some(cb) = &mut self.update {
            (cb)(id, delta);
        }
    }

    fn finish(&mut self, id: &str) {
        if let Some(cb) = &mut self.finish {
            (cb)(id);
        }
    }
}

#[derive(Default)]
pub(crate) struct Progress<'p> {
    internal: Rc<RefCell<ProgressInternal<'p>>>,
}

impl<'p> Progress<'p> {
    pub(crate) fn new() -> Progress<'p> {
        Progress::default()
    }

    pub(crate) fn with_progress_start(&mut self, cb: impl FnMut(&str, u64) + 'p) {
        self.internal.borrow_mut().start = Some(Box::new(cb))
    }

    pub(crate) fn with_progress_update(&mut self, cb: impl FnMut(&str, u64) + 'p) {
        self.internal.borrow_mut().update = Some(Box::new(cb))
    }

    pub(crate) fn with_progress_finish(&mut self, cb: impl FnMut(&str) + 'p) {
        self.internal.borrow_mut().finish = Some(Box::new(cb))
    }
}

impl<'p> Progress<'p> {
    pub(crate) fn bar(&self, name: &str, len: u64) -> ProgressBar<'p> {
        ProgressBar::new(self.internal.clone(), name, len)
    }
}

/// A single tracked unit of work. Finishes itself when dropped, so an early
/// return never leaves a bar running.
pub(crate) struct ProgressBar<'p> {
    name: String,
    finished: bool,
    internal: Rc<RefCell<ProgressInternal<'p>>>,
}

impl<'p> ProgressBar<'p> {
    fn new<S: Into<String>>(
        internal: Rc<RefCell<ProgressInternal<'p>>>,
        name: S,
        len: u64,
    ) -> ProgressBar<'p> {
        let name = name.into();
        let bar = ProgressBar {
            name,
            finished: false,
            internal,
        };

        bar.start(len);
        bar
    }

    fn start(&self, len: u64) {
        self.internal.borrow_mut().start(self.name.as_str(), len);
    }

    pub(crate) fn update(&self, delta: u64) {
        self.internal.borrow_mut().update(self.name.as_str(), delta);
    }

    pub(crate) fn finish(mut self) {
        self.finish_once();
    }

    fn finish_once(&mut self) {
        if !self.finished {
            self.finished = true;
            self.internal.borrow_mut().finish(self.name.as_str());
        }
    }
}

impl<'p> Drop for ProgressBar<'p> {
    fn drop(&mut self) {
        self.finish_once();
    }
}

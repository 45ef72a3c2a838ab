use tracing::trace;

use logsift_types::{Log, LogBuilder, LogField};

use crate::convert::{CaptureDecoder, GroupBindings};
use crate::options::ReadingOptions;
use crate::pattern::{LogPattern, LogPatternMatchingMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// One plain pattern, one log per matching line
    Single,
    Sequential,
    Arbitrary { first_match_required: bool },
}

/// Drives a [`LogBuilder`] from successive lines
///
/// Owned by one reading pass. Completed logs are handed to the `emit`
/// callback in the order their last line was consumed.
pub(crate) struct PatternMatcher {
    patterns: Vec<LogPattern>,
    bindings: Vec<GroupBindings>,
    decoder: CaptureDecoder,
    builder: LogBuilder,
    strategy: Strategy,

    /// Attached to the first line of each log when reading a file
    file_name: Option<String>,

    /// Pattern expected next (sequential)
    index: usize,

    /// Pattern at `index` matched at least one line of the current log
    current_matched: bool,

    /// Patterns that matched a line of the current log (arbitrary)
    matched: Vec<bool>,
}

impl PatternMatcher {
    pub fn new(options: &ReadingOptions, builder: LogBuilder, file_name: Option<String>) -> Self {
        let decoder = CaptureDecoder::new(options);
        let patterns = options.patterns.clone();
        let bindings = patterns.iter().map(|p| decoder.bind(p)).collect();
        let strategy = match (patterns.as_slice(), options.matching_mode) {
            ([only], _) if !only.is_repeatable() && !only.is_skippable() => Strategy::Single,
            (_, LogPatternMatchingMode::Sequential) => Strategy::Sequential,
            (_, LogPatternMatchingMode::Arbitrary) => Strategy::Arbitrary {
                first_match_required: false,
            },
            (_, LogPatternMatchingMode::ArbitraryAfterFirstMatch) => Strategy::Arbitrary {
                first_match_required: true,
            },
        };
        let matched = vec![false; patterns.len()];
        Self {
            patterns,
            bindings,
            decoder,
            builder,
            strategy,
            file_name,
            index: 0,
            current_matched: false,
            matched,
        }
    }

    /// Feed one line
    pub fn process_line(&mut self, line: &str, line_number: u64, emit: &mut impl FnMut(Log)) {
        if self.patterns.is_empty() {
            return;
        }
        match self.strategy {
            Strategy::Single => self.process_single(line, line_number, emit),
            Strategy::Sequential => self.process_sequential(line, line_number, emit),
            Strategy::Arbitrary {
                first_match_required,
            } => self.process_arbitrary(line, line_number, first_match_required, emit),
        }
    }

    /// Whether the pending log could be completed by skipping what is left
    ///
    /// When true, the caller should wait a bounded time for the next line
    /// and call [`PatternMatcher::on_line_timeout`] if none arrives.
    pub fn wants_lookahead(&self) -> bool {
        self.strategy == Strategy::Sequential
            && self.builder.is_not_empty()
            && self.can_complete_by_skipping()
    }

    /// No line arrived in time, skip the remaining skippable patterns
    pub fn on_line_timeout(&mut self, emit: &mut impl FnMut(Log)) {
        if self.strategy != Strategy::Sequential || self.builder.is_empty() {
            return;
        }
        let current = &self.patterns[self.index];
        if current.is_repeatable() && self.current_matched {
            self.next_pattern();
        }
        while self.index < self.patterns.len() && self.patterns[self.index].is_skippable() {
            self.next_pattern();
        }
        if self.index >= self.patterns.len() {
            self.complete(emit);
        }
    }

    /// End of input, complete the pending log if it can be and drop it otherwise
    pub fn finish(&mut self, emit: &mut impl FnMut(Log)) {
        self.on_line_timeout(emit);
        self.discard();
    }

    fn process_single(&mut self, line: &str, line_number: u64, emit: &mut impl FnMut(Log)) {
        let Some(captures) = self.patterns[0].regex().captures(line) else {
            trace!(line, "line not matched");
            return;
        };
        self.decoder.apply(&mut self.builder, &captures, &self.bindings[0]);
        self.attach_location(line_number);
        emit(self.builder.build_and_reset());
    }

    fn process_sequential(&mut self, line: &str, line_number: u64, emit: &mut impl FnMut(Log)) {
        let mut reoffered = false;
        loop {
            let pattern = &self.patterns[self.index];
            let repeatable = pattern.is_repeatable();
            let skippable = pattern.is_skippable();
            if let Some(captures) = pattern.regex().captures(line) {
                self.decoder
                    .apply(&mut self.builder, &captures, &self.bindings[self.index]);
                if self.index == 0 && !self.current_matched {
                    self.attach_location(line_number);
                }
                if repeatable {
                    self.current_matched = true;
                } else if self.next_pattern() {
                    self.complete(emit);
                }
                return;
            }

            if skippable || (repeatable && self.current_matched) {
                if self.next_pattern() {
                    self.complete(emit);
                    if reoffered {
                        return;
                    }
                    reoffered = true;
                }
                continue;
            }

            // Required pattern missed, the pending log is incomplete
            let at_start = self.index == 0;
            if self.builder.is_not_empty() {
                trace!(line, pattern = %pattern, "dropping incomplete log");
            }
            self.discard();
            if at_start || reoffered {
                trace!(line, "line not matched");
                return;
            }
            reoffered = true;
        }
    }

    fn process_arbitrary(
        &mut self,
        line: &str,
        line_number: u64,
        first_match_required: bool,
        emit: &mut impl FnMut(Log),
    ) {
        if first_match_required {
            if self.patterns[0].regex().is_match(line) {
                if self.matched[0] && !self.patterns[0].is_repeatable() {
                    self.discard();
                }
                self.accept_arbitrary(0, line, line_number, emit);
                return;
            }
            if !self.matched[0] {
                trace!(line, "waiting for first pattern");
                return;
            }
        }

        let candidate = (0..self.patterns.len()).find(|&i| {
            (!self.matched[i] || self.patterns[i].is_repeatable())
                && self.patterns[i].regex().is_match(line)
        });
        if let Some(i) = candidate {
            self.accept_arbitrary(i, line, line_number, emit);
            return;
        }

        // A filled pattern matching again starts the next log
        let restart = (0..self.patterns.len())
            .find(|&i| self.matched[i] && self.patterns[i].regex().is_match(line));
        match restart {
            Some(i) => {
                trace!(line, "dropping incomplete log");
                self.discard();
                self.accept_arbitrary(i, line, line_number, emit);
            }
            None => trace!(line, "line not matched"),
        }
    }

    fn accept_arbitrary(&mut self, i: usize, line: &str, line_number: u64, emit: &mut impl FnMut(Log)) {
        let Some(captures) = self.patterns[i].regex().captures(line) else {
            return;
        };
        if !self.matched.iter().any(|m| *m) {
            self.attach_location(line_number);
        }
        self.decoder
            .apply(&mut self.builder, &captures, &self.bindings[i]);
        self.matched[i] = true;

        let complete = self
            .patterns
            .iter()
            .zip(&self.matched)
            .all(|(pattern, matched)| *matched || pattern.is_skippable());
        if complete {
            self.complete(emit);
        }
    }

    fn can_complete_by_skipping(&self) -> bool {
        let current = &self.patterns[self.index];
        (current.is_skippable() || (current.is_repeatable() && self.current_matched))
            && self.patterns[self.index + 1..]
                .iter()
                .all(LogPattern::is_skippable)
    }

    /// Move to the next pattern, true when the cycle is over
    fn next_pattern(&mut self) -> bool {
        self.index += 1;
        self.current_matched = false;
        self.index >= self.patterns.len()
    }

    fn complete(&mut self, emit: &mut impl FnMut(Log)) {
        if self.builder.is_not_empty() {
            emit(self.builder.build_and_reset());
        }
        self.index = 0;
        self.current_matched = false;
        self.matched.fill(false);
    }

    fn discard(&mut self) {
        self.builder.reset();
        self.index = 0;
        self.current_matched = false;
        self.matched.fill(false);
    }

    fn attach_location(&mut self, line_number: u64) {
        if let Some(file_name) = &self.file_name {
            self.builder.set(LogField::FileName, file_name);
            self.builder
                .set(LogField::LineNumber, &line_number.to_string());
        }
    }
}

//! Scenario tests driving the whole judging pipeline with real processes.

mod util;

//! Console presentation of cycle outcomes. The core only produces
//! `CycleOutcome` values; printing them is this sink's whole job.

use crate::monitor::{CycleOutcome, EventSink};

pub struct ConsoleReporter;

impl EventSink for ConsoleReporter {
    fn emit(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::MutualTopicDetected {
                headline,
                perspective_a,
                perspective_b,
                confidence,
                timestamp,
            } => {
                println!("{}", "=".repeat(72));
                println!("MUTUAL TOPIC DETECTED");
                println!("{}", "=".repeat(72));
                println!("Headline:    {headline}");
                println!("Right-wing:  {perspective_a}");
                println!("Left-wing:   {perspective_b}");
                println!("Confidence:  {confidence:.2}");
                println!("Detected at: {}", timestamp.format("%H:%M:%S"));
                println!("{}", "=".repeat(72));
            }
            CycleOutcome::NoTopicFound { timestamp } => {
                println!(
                    "{} - no mutual topic found in recent messages",
                    timestamp.format("%H:%M:%S")
                );
            }
        }
    }
}

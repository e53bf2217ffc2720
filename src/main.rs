use std::{env, ffi::OsString};

use alfa::{
    message::format_date_time,
    resolver::resolve,
    sequence::{format_duration, Sequence},
};
use anyhow::Result;
use log::{debug, error};

const TOPIC_NAME: &str = "mavros-nav_info-roll";
const FIELD_NAME: &str = "commanded";
const RECORD_COUNT: usize = 5;
const SEPARATOR: &str = " | ";

fn print_usage(program: &str) {
    println!("Please provide the path to the sequence bag file!");
    println!("Usage (in Linux/Mac):");
    println!("  {} path/to/sequence.bag", program);
    println!("Usage (in Windows):");
    println!("  {} path\\to\\sequence.bag", program);
    println!("The topic exports (<sequence>-<topic>.csv) must be next to the bag file.");
}

/// Converts the raw process arguments, handing back the first one that is
/// not valid Unicode.
fn collect_args(args: impl IntoIterator<Item = OsString>) -> Result<Vec<String>, OsString> {
    args.into_iter().map(OsString::into_string).collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match collect_args(env::args_os()) {
        Ok(args) => args,
        Err(arg) => {
            debug!("rejected arguments: {:?} is not valid Unicode", arg);
            print_usage("alfa-demo");
            return Ok(());
        }
    };
    let program = args.first().map(String::as_str).unwrap_or("alfa-demo");

    // invalid input still exits with 0
    let reference = match resolve(args.get(1..).unwrap_or(&[])) {
        Ok(r) => r,
        Err(rejection) => {
            debug!("rejected arguments: {}", rejection);
            print_usage(program);
            return Ok(());
        }
    };

    let sequence = Sequence::new(reference.directory(), reference.base_name());
    if !sequence.is_initialized() {
        print_usage(program);
        return Ok(());
    }

    sequence.print_brief_info()?;
    println!();

    let Some(topic_index) = sequence.find_topic_index(TOPIC_NAME) else {
        error!("topic {} not found in {}", TOPIC_NAME, sequence.name);
        return Ok(());
    };
    let topic = &sequence.topics[topic_index];

    println!("First {} messages of {}:", RECORD_COUNT, topic.name);
    topic.print_header(SEPARATOR)?;
    topic.print(0, Some(RECORD_COUNT), SEPARATOR)?;
    println!();

    match sequence.find_first_fault_message() {
        Some(i) => {
            if let (Some(msg), Some(fault_topic)) =
                (sequence.get_message(i), sequence.topic_of_message(i))
            {
                println!("First fault message ({}): {}", fault_topic.name, msg);
            }
            if let Some(d) = sequence.get_normal_flight_duration() {
                println!("Normal flight duration: {}", format_duration(d));
            }
        }
        None => println!("No fault message found"),
    }
    println!();

    match topic.get_fields_as_double_by_name(FIELD_NAME, 0, Some(RECORD_COUNT)) {
        Ok(values) => {
            let times = topic.get_times(0, Some(RECORD_COUNT));
            for (time, value) in times.iter().zip(values) {
                println!("{}{}{} = {}", format_date_time(time), SEPARATOR, FIELD_NAME, value);
            }
        }
        Err(e) => error!("{:#}", e),
    }

    Ok(())
}

pub mod job_reader;
pub mod trail_writer;

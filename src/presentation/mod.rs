// Presentation layer - Alert rendering, report output and stats tables
pub mod html;
pub mod report_writer;
pub mod stats_writer;

pub mod pending_sweeper;

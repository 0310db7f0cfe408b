pub mod pending_reaper;

pub mod handle_history;

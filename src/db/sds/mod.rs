pub mod token_launches_archive;

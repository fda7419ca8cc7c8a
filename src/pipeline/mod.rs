pub mod extraction;
pub mod storage;
pub mod linking;

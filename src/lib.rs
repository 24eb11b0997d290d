pub mod georegistry;

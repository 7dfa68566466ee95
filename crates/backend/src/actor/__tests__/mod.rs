pub mod helpers;

mod lifecycle;
mod seeding;

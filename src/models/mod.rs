pub mod course;
pub mod grade;
pub mod grade_year;
pub mod student;

pub use course::{Course, CourseCode};
pub use grade::{format_number, GradeParseError, LetterGrade};
pub use grade_year::GradeYear;
pub use student::{GradesView, Student};

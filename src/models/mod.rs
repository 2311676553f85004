pub mod alert;
pub mod enums;
pub mod patient;
pub mod reading;
pub mod suggestion;
pub mod threshold;

pub use alert::*;
pub use enums::*;
pub use patient::*;
pub use reading::*;
pub use suggestion::*;
pub use threshold::*;

pub mod item;
pub mod value;

pub use item::{ConfigItem, ModifyLimit, ParamSpec};
pub use value::{TypedValue, ValueType};

pub mod message;
pub mod review;
pub mod test_case;

pub use message::{
    Attachment, ChatHistory, ChatHistoryInput, ChatMessage, MessageType, StreamEvent, ToolCall,
    UserInput,
};
pub use review::ReviewResult;
pub use test_case::TestCase;

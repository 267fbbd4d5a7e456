// Domain models: IPC packets, persisted daily records, query views

mod log_data;
mod packet;
mod view;

pub use log_data::{
    DailyLog, HistoryEntry, LogData, LogOverview, LogSection, LogTimings, MinMax,
};
pub use packet::Packet;
pub use view::{StatisticsResponse, StatisticsView};

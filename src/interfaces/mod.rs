pub mod http;
pub mod llm;
pub mod whatsapp;
pub mod whatsapp_api;

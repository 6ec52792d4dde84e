/// 长生命周期的服务组件；名称用于日志
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;
}

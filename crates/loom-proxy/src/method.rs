/// A parsed RPC method path, `/<package>.<Service>/<Method>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPath<'a> {
    /// Fully-qualified service, e.g. `orders.OrderService`.
    pub service: &'a str,
    pub method: &'a str,
}

impl<'a> MethodPath<'a> {
    pub fn parse(path: &'a str) -> Option<Self> {
        let (service, method) = path.strip_prefix('/')?.split_once('/')?;
        if service.is_empty() || method.is_empty() || method.contains('/') {
            return None;
        }
        Some(Self { service, method })
    }

    /// Name of the component owning the service: the package segment up to
    /// the first dot.
    pub fn component(&self) -> &'a str {
        self.service
            .split_once('.')
            .map_or(self.service, |(package, _)| package)
    }
}

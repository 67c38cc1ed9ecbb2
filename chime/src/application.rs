use crate::icon::Icon;
use crate::notification::Action;
use uuid::Uuid;

/// A client of the notification core.
///
/// Applications are identified by name in the registry; the token distinguishes two
/// `Application` values that happen to share a name.
#[derive(Debug, Clone)]
pub struct Application {
    name: String,
    icon: Icon,
    actions: Vec<Action>,
    token: Uuid,
}

impl Application {
    pub fn new(name: impl Into<String>, icon: Icon) -> Self {
        Self {
            name: name.into(),
            icon,
            actions: vec![],
            token: Uuid::new_v4(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> &Icon {
        &self.icon
    }

    /// Action templates this application offers on its notifications.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn token(&self) -> Uuid {
        self.token
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for Application {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applications_get_unique_tokens() {
        let a = Application::new("Mail", Icon::default_icon());
        let b = Application::new("Mail", Icon::default_icon());
        assert_eq!(a.name(), b.name());
        assert_ne!(a.token(), b.token());
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_with_action() {
        let app = Application::new("Mail", Icon::default_icon())
            .with_action(Action::new(1, "Reply"))
            .with_action(Action::new(2, "Archive"));
        assert_eq!(app.actions().len(), 2);
        assert_eq!(app.actions()[1].name, "Archive");
    }
}
